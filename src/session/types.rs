use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::agents::{AgentKind, CognitiveFlag, ResponseType, TelemetryEvent};
use crate::linkography::DesignPhase;
use crate::metrics::{CognitiveMetric, CognitiveMetrics, TurnSignal};
use crate::phase::LearningStep;
use crate::routing::{Classification, Route};

/// Experimental condition of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    /// Multi-agent Socratic tutor.
    #[default]
    Mentor,
    /// A single plain LLM assistant.
    GenericAi,
    /// Neutral acknowledgement only.
    Control,
}

impl Arm {
    /// All arms in table order.
    pub const ALL: [Arm; 3] = [Arm::Mentor, Arm::GenericAi, Arm::Control];

    /// Get the arm name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Arm::Mentor => "mentor",
            Arm::GenericAi => "generic_ai",
            Arm::Control => "control",
        }
    }
}

impl std::fmt::Display for Arm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "mentor" => Ok(Arm::Mentor),
            "generic_ai" | "generic" => Ok(Arm::GenericAi),
            "control" => Ok(Arm::Control),
            _ => Err(format!("Unknown arm: {}", s)),
        }
    }
}

/// Coarse learner level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proficiency {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl Proficiency {
    /// All levels in table order.
    pub const ALL: [Proficiency; 4] = [
        Proficiency::Beginner,
        Proficiency::Intermediate,
        Proficiency::Advanced,
        Proficiency::Expert,
    ];

    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Proficiency::Beginner => "beginner",
            Proficiency::Intermediate => "intermediate",
            Proficiency::Advanced => "advanced",
            Proficiency::Expert => "expert",
        }
    }

    /// Reply length (words) that suits this level best.
    pub fn target_reply_words(&self) -> usize {
        match self {
            Proficiency::Beginner => 110,
            Proficiency::Intermediate => 85,
            Proficiency::Advanced => 65,
            Proficiency::Expert => 45,
        }
    }
}

impl std::fmt::Display for Proficiency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Proficiency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Proficiency::ALL
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown proficiency: {}", s))
    }
}

/// How well a reply's length suits the learner, in [0, 1].
pub fn guidance_fit(proficiency: Proficiency, reply_words: usize) -> f64 {
    let target = proficiency.target_reply_words() as f64;
    let distance = (reply_words as f64 - target).abs() / target;
    (1.0 - distance).clamp(0.0, 1.0)
}

/// A stored tutoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub arm: Arm,
    pub proficiency: Proficiency,
    /// Short description of the learner's project.
    pub project_context: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl SessionRecord {
    /// Create a new session record
    pub fn new(arm: Arm, proficiency: Proficiency, project_context: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            arm,
            proficiency,
            project_context: project_context.into(),
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Use a fixed session id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach free-form metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One tutor turn. Appended once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub session_id: String,
    /// 0-based, strictly increasing within a session.
    pub turn: usize,
    pub created_at: DateTime<Utc>,
    pub input_text: String,
    pub classification: Option<Classification>,
    /// Route the reply was produced on (mentor arm only).
    pub route: Option<Route>,
    pub agents_invoked: Vec<AgentKind>,
    pub response_text: String,
    pub response_type: ResponseType,
    pub telemetry: Vec<TelemetryEvent>,
    pub cognitive_flags: Vec<CognitiveFlag>,
    /// Response-level estimates from the enhancement agent.
    pub enhancement_metrics: CognitiveMetrics,
    /// Change of each session metric caused by this turn.
    pub metric_deltas: BTreeMap<CognitiveMetric, f64>,
    pub phase: DesignPhase,
    pub step: LearningStep,
    pub signal: TurnSignal,
    /// Some node fell back or timed out.
    pub degraded: bool,
}

impl Interaction {
    /// Create an interaction for a turn with a fresh id
    pub fn new(session_id: impl Into<String>, turn: usize, input_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            turn,
            created_at: Utc::now(),
            input_text: input_text.into(),
            classification: None,
            route: None,
            agents_invoked: Vec::new(),
            response_text: String::new(),
            response_type: ResponseType::Acknowledgement,
            telemetry: Vec::new(),
            cognitive_flags: Vec::new(),
            enhancement_metrics: CognitiveMetrics::zeroed(),
            metric_deltas: BTreeMap::new(),
            phase: DesignPhase::Ideation,
            step: LearningStep::InitialContextReasoning,
            signal: TurnSignal::default(),
            degraded: false,
        }
    }

    /// Whether an agent ran during this turn.
    pub fn invoked(&self, agent: AgentKind) -> bool {
        self.agents_invoked.contains(&agent)
    }
}
