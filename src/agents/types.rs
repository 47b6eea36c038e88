use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::analysis::AnalysisSummary;
use super::telemetry::TelemetrySink;
use crate::linkography::LinkographMetrics;
use crate::llm::Message;
use crate::metrics::CognitiveMetrics;
use crate::phase::PhaseAssessment;
use crate::routing::{Classification, QuestionPolicy, Route};
use crate::session::{Arm, Proficiency};
use crate::text::truncate_words;

/// The specialised agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Analysis,
    Context,
    DomainExpert,
    Socratic,
    Enhancement,
    /// The single plain assistant of the generic AI arm.
    Assistant,
}

impl AgentKind {
    /// The workflow agents in workflow order.
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Context,
        AgentKind::Analysis,
        AgentKind::DomainExpert,
        AgentKind::Socratic,
        AgentKind::Enhancement,
    ];

    /// Get the agent name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Analysis => "analysis",
            AgentKind::Context => "context",
            AgentKind::DomainExpert => "domain_expert",
            AgentKind::Socratic => "socratic",
            AgentKind::Enhancement => "enhancement",
            AgentKind::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed set of response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Internal analysis, never shown to the learner.
    Analysis,
    /// Internal classification.
    Classification,
    /// Technical content.
    Knowledge,
    /// A single question.
    SocraticQuestion,
    /// Guidance without a question.
    Scaffolding,
    /// Guidance followed by one question.
    BalancedSynthesis,
    /// Final, policy-checked reply.
    Enhanced,
    /// Acknowledgement plus open question after a failure.
    Fallback,
    /// Reply of the generic assistant arm.
    Generic,
    /// Neutral acknowledgement of the control arm.
    Acknowledgement,
}

impl ResponseType {
    /// Get the response type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Analysis => "analysis",
            ResponseType::Classification => "classification",
            ResponseType::Knowledge => "knowledge",
            ResponseType::SocraticQuestion => "socratic_question",
            ResponseType::Scaffolding => "scaffolding",
            ResponseType::BalancedSynthesis => "balanced_synthesis",
            ResponseType::Enhanced => "enhanced",
            ResponseType::Fallback => "fallback",
            ResponseType::Generic => "generic",
            ResponseType::Acknowledgement => "acknowledgement",
        }
    }
}

/// Pedagogical flags attached to replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CognitiveFlag {
    ScaffoldingProvided,
    DeepThinkingEncouraged,
    ChallengeIssued,
    SocraticQuestion,
    BalancedGuidance,
    KnowledgeProvided,
    OffloadingPrevented,
    ReflectionPrompted,
    PhaseGuidance,
}

impl CognitiveFlag {
    /// Get the flag name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveFlag::ScaffoldingProvided => "SCAFFOLDING_PROVIDED",
            CognitiveFlag::DeepThinkingEncouraged => "DEEP_THINKING_ENCOURAGED",
            CognitiveFlag::ChallengeIssued => "CHALLENGE_ISSUED",
            CognitiveFlag::SocraticQuestion => "SOCRATIC_QUESTION",
            CognitiveFlag::BalancedGuidance => "BALANCED_GUIDANCE",
            CognitiveFlag::KnowledgeProvided => "KNOWLEDGE_PROVIDED",
            CognitiveFlag::OffloadingPrevented => "OFFLOADING_PREVENTED",
            CognitiveFlag::ReflectionPrompted => "REFLECTION_PROMPTED",
            CognitiveFlag::PhaseGuidance => "PHASE_GUIDANCE",
        }
    }
}

impl std::fmt::Display for CognitiveFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agent-specific structured output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentMetadata {
    #[default]
    None,
    Analysis(AnalysisSummary),
    Classification(Classification),
    Knowledge {
        topics: Vec<String>,
        sources: Vec<String>,
        offline: bool,
    },
    Question {
        question: Option<String>,
        templated: bool,
    },
    Enhancement {
        policy: QuestionPolicy,
        edits: Vec<String>,
    },
}

/// Typed output of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent: AgentKind,
    pub response_text: String,
    pub response_type: ResponseType,
    /// Deduplicated, in the order they were raised.
    pub cognitive_flags: Vec<CognitiveFlag>,
    /// Response-level estimates of the six metrics.
    pub enhancement_metrics: CognitiveMetrics,
    pub key_points: Vec<String>,
    pub metadata: AgentMetadata,
}

impl AgentResponse {
    /// Create a response with no flags or metadata
    pub fn new(agent: AgentKind, response_type: ResponseType, text: impl Into<String>) -> Self {
        Self {
            agent,
            response_text: text.into(),
            response_type,
            cognitive_flags: Vec::new(),
            enhancement_metrics: CognitiveMetrics::zeroed(),
            key_points: Vec::new(),
            metadata: AgentMetadata::None,
        }
    }

    /// Raise a flag (ignored if already raised)
    pub fn with_flag(mut self, flag: CognitiveFlag) -> Self {
        self.add_flag(flag);
        self
    }

    /// Raise a flag in place
    pub fn add_flag(&mut self, flag: CognitiveFlag) {
        if !self.cognitive_flags.contains(&flag) {
            self.cognitive_flags.push(flag);
        }
    }

    /// Set the key points
    pub fn with_key_points(mut self, key_points: Vec<String>) -> Self {
        self.key_points = key_points;
        self
    }

    /// Set the agent-specific metadata
    pub fn with_metadata(mut self, metadata: AgentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the response-level metric estimates
    pub fn with_metrics(mut self, metrics: CognitiveMetrics) -> Self {
        self.enhancement_metrics = metrics;
        self
    }

    /// Whether a flag was raised.
    pub fn has_flag(&self, flag: CognitiveFlag) -> bool {
        self.cognitive_flags.contains(&flag)
    }
}

/// Result of running an agent node.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Ok(AgentResponse),
    /// The agent could not do its job; the orchestrator falls back.
    Degraded { reason: String },
    /// The node exceeded its soft deadline.
    Cancelled,
}

impl AgentOutcome {
    /// The response, if the agent succeeded.
    pub fn response(self) -> Option<AgentResponse> {
        match self {
            AgentOutcome::Ok(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the agent succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, AgentOutcome::Ok(_))
    }

    /// Short label for telemetry.
    pub fn label(&self) -> &'static str {
        match self {
            AgentOutcome::Ok(_) => "ok",
            AgentOutcome::Degraded { .. } => "degraded",
            AgentOutcome::Cancelled => "cancelled",
        }
    }
}

/// Read-only view of the session handed to agents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub session_id: String,
    pub arm: Arm,
    pub proficiency: Proficiency,
    /// Short description of the learner's project.
    pub project_context: String,
    /// 0-based turn number.
    pub turn: usize,
    pub student_moves: usize,
    /// Metrics of the whole session linkograph so far.
    pub linkograph: LinkographMetrics,
    /// Metrics of the current phase's sub-linkograph.
    pub phase_linkograph: LinkographMetrics,
}

impl SessionView {
    /// Phrase that anchors a question to the learner's project.
    pub fn project_anchor(&self) -> String {
        let context = self.project_context.trim();
        if context.is_empty() {
            return "your design".to_string();
        }
        let short = truncate_words(context, 6);
        let lower = short.to_lowercase();
        if lower.starts_with("your ") || lower.starts_with("my ") {
            format!("your {}", short.split_once(' ').map(|(_, rest)| rest).unwrap_or(""))
        } else if lower.starts_with("a ") || lower.starts_with("an ") || lower.starts_with("the ") {
            format!("your {}", short.split_once(' ').map(|(_, rest)| rest).unwrap_or(""))
        } else {
            format!("your {}", short)
        }
    }
}

/// Everything an agent may read during a turn.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub session: SessionView,
    /// The learner's current message.
    pub input: String,
    /// Most recent conversation messages, oldest first.
    pub recent_messages: Vec<Message>,
    pub phase: PhaseAssessment,
    pub classification: Option<Classification>,
    pub route: Option<Route>,
    pub analysis: Option<AnalysisSummary>,
    /// Domain expert output, when it ran.
    pub expert: Option<AgentResponse>,
    /// Composed reply awaiting the post-check.
    pub draft: Option<AgentResponse>,
    /// Visual artefact submitted with the turn.
    pub image: Option<Arc<Vec<u8>>>,
}

impl AgentContext {
    /// Create a context for one learner message
    pub fn new(session: SessionView, input: impl Into<String>) -> Self {
        Self {
            session,
            input: input.into(),
            ..Self::default()
        }
    }

    /// Set the recent conversation
    pub fn with_recent_messages(mut self, messages: Vec<Message>) -> Self {
        self.recent_messages = messages;
        self
    }

    /// Set the phase assessment
    pub fn with_phase(mut self, phase: PhaseAssessment) -> Self {
        self.phase = phase;
        self
    }

    /// Attach a visual artefact
    pub fn with_image(mut self, image: Arc<Vec<u8>>) -> Self {
        self.image = Some(image);
        self
    }

    /// Route of the turn, defaulting to balanced guidance.
    pub fn route_or_default(&self) -> Route {
        self.route
            .or_else(|| self.classification.as_ref().map(|c| c.routing_path))
            .unwrap_or_default()
    }
}

/// A specialised agent. Implementations hold an injected kernel and never
/// return errors: failures are reported as [`AgentOutcome::Degraded`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// Which agent this is.
    fn kind(&self) -> AgentKind;

    /// Produce this agent's contribution to the turn.
    async fn respond(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> AgentOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_serialize_screaming_snake() {
        let json = serde_json::to_value(CognitiveFlag::ScaffoldingProvided).unwrap();
        assert_eq!(json, "SCAFFOLDING_PROVIDED");
        assert_eq!(
            CognitiveFlag::DeepThinkingEncouraged.to_string(),
            "DEEP_THINKING_ENCOURAGED"
        );
    }

    #[test]
    fn test_add_flag_deduplicates() {
        let mut r = AgentResponse::new(AgentKind::Socratic, ResponseType::SocraticQuestion, "Why?")
            .with_flag(CognitiveFlag::SocraticQuestion);
        r.add_flag(CognitiveFlag::SocraticQuestion);
        assert_eq!(r.cognitive_flags.len(), 1);
        assert!(r.has_flag(CognitiveFlag::SocraticQuestion));
    }

    #[test]
    fn test_project_anchor() {
        let mut view = SessionView::default();
        assert_eq!(view.project_anchor(), "your design");
        view.project_context = "a community centre in Leeds".to_string();
        assert_eq!(view.project_anchor(), "your community centre in Leeds");
        view.project_context = "riverside library".to_string();
        assert_eq!(view.project_anchor(), "your riverside library");
    }

    #[test]
    fn test_outcome_helpers() {
        let ok = AgentOutcome::Ok(AgentResponse::new(
            AgentKind::Context,
            ResponseType::Classification,
            "",
        ));
        assert!(ok.is_ok());
        assert_eq!(ok.label(), "ok");
        assert_eq!(AgentOutcome::Cancelled.label(), "cancelled");
        assert!(AgentOutcome::Degraded {
            reason: "x".to_string()
        }
        .response()
        .is_none());
    }

    #[test]
    fn test_metadata_tagged_serialization() {
        let meta = AgentMetadata::Question {
            question: Some("Why?".to_string()),
            templated: false,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "question");
    }
}
