use async_trait::async_trait;
use tracing::debug;

use super::telemetry::TelemetrySink;
use super::types::{Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, ResponseType};
use crate::routing::{
    select_route, Classification, ConfidenceLevel, EngagementLevel, InteractionType,
    RouteDecision, UnderstandingLevel,
};
use crate::text::{contains_any, ends_with_question, keyword_hits, tokenize, word_count};

const CONFUSION: &[&str] = &[
    "confused",
    "confusing",
    "don't understand",
    "do not understand",
    "no idea",
    "lost",
    "stuck",
    "not sure where to start",
    "don't know where to start",
];

const UNCERTAINTY: &[&str] = &[
    "not sure",
    "unsure",
    "i guess",
    "maybe",
    "perhaps",
    "i don't know",
    "not certain",
];

const OVERCONFIDENCE: &[&str] = &[
    "obviously",
    "definitely",
    "clearly",
    "perfect",
    "the best",
    "100%",
    "no doubt",
    "certainly",
    "i know exactly",
    "nothing to improve",
];

// Checked before knowledge phrases: "how should I" is a guidance request even
// though it ends with a question mark.
const GUIDANCE: &[&str] = &[
    "how should i",
    "how can i",
    "how do i",
    "how would i",
    "organise",
    "organize",
    "ideas for",
    "where should i",
    "what should i",
];

const FEEDBACK: &[&str] = &[
    "what do you think",
    "feedback",
    "is this good",
    "thoughts on",
    "does this work",
    "review my",
];

const KNOWLEDGE: &[&str] = &[
    "what is",
    "what are",
    "what's",
    "requirement",
    "standard",
    "code",
    "regulation",
    "how much",
    "how many",
    "minimum",
    "maximum",
];

const TECHNICAL: &[&str] = &[
    "circulation", "structure", "structural", "cantilever", "span", "load", "daylight",
    "ventilation", "section", "elevation", "massing", "program", "egress", "accessib*",
    "zoning", "facade", "thermal", "acoustic", "orientation", "threshold", "typology",
    "materiality", "precedent",
];

const LOW_EFFORT_TOKENS: &[&str] = &["ok", "okay", "whatever", "idk", "k"];
const LOW_EFFORT_PHRASES: &[&str] = &["just tell me", "just give me", "do it for me"];

const LOW_ENGAGEMENT_WORDS: usize = 3;
const HIGH_ENGAGEMENT_WORDS: usize = 30;
const HIGH_UNDERSTANDING_WORDS: usize = 25;
const HIGH_UNDERSTANDING_TERMS: usize = 2;

/// Deterministic keyword classifier for learner turns.
#[derive(Debug, Clone, Default)]
pub struct ContextAgent;

impl ContextAgent {
    /// Create a context classifier
    pub fn new() -> Self {
        Self
    }

    /// Classify one learner message and pick its route.
    pub fn classify(&self, input: &str) -> (Classification, RouteDecision) {
        let lower = input.to_lowercase();
        let words = word_count(input);

        let confused = contains_any(&lower, CONFUSION);
        let uncertain = confused || contains_any(&lower, UNCERTAINTY);
        let overconfident = contains_any(&lower, OVERCONFIDENCE);
        let ambiguous = uncertain && overconfident;

        let confidence_level = match (uncertain, overconfident) {
            (true, false) => ConfidenceLevel::Uncertain,
            (false, true) => ConfidenceLevel::Overconfident,
            _ => ConfidenceLevel::Confident,
        };

        let interaction_type = if confused {
            InteractionType::Confusion
        } else if contains_any(&lower, GUIDANCE) {
            InteractionType::DesignGuidance
        } else if contains_any(&lower, FEEDBACK) {
            InteractionType::FeedbackRequest
        } else if contains_any(&lower, KNOWLEDGE) || ends_with_question(&lower) {
            InteractionType::KnowledgeRequest
        } else {
            InteractionType::DesignExploration
        };

        let understanding_level = if confused {
            UnderstandingLevel::Low
        } else if words >= HIGH_UNDERSTANDING_WORDS
            && keyword_hits(&lower, TECHNICAL) >= HIGH_UNDERSTANDING_TERMS
        {
            UnderstandingLevel::High
        } else {
            UnderstandingLevel::Medium
        };

        let tokens = tokenize(&lower);
        let low_effort = tokens.iter().any(|t| LOW_EFFORT_TOKENS.contains(&t.as_str()))
            || contains_any(&lower, LOW_EFFORT_PHRASES);
        let engagement_level = if words <= LOW_ENGAGEMENT_WORDS || low_effort {
            EngagementLevel::Low
        } else if words >= HIGH_ENGAGEMENT_WORDS {
            EngagementLevel::High
        } else {
            EngagementLevel::Medium
        };

        let mut classification = Classification {
            interaction_type,
            understanding_level,
            confidence_level,
            engagement_level,
            ambiguous,
            ..Classification::default()
        };
        let decision = select_route(&classification);
        classification.routing_path = decision.route;
        (classification, decision)
    }
}

#[async_trait]
impl Agent for ContextAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Context
    }

    async fn respond(&self, ctx: &AgentContext, _telemetry: &TelemetrySink) -> AgentOutcome {
        let (classification, decision) = self.classify(&ctx.input);
        debug!(
            interaction_type = %classification.interaction_type,
            understanding = %classification.understanding_level,
            confidence = %classification.confidence_level,
            route = %decision.route,
            reason = decision.reason,
            ambiguous = decision.ambiguous,
            "Turn classified"
        );
        AgentOutcome::Ok(
            AgentResponse::new(
                AgentKind::Context,
                ResponseType::Classification,
                decision.route.as_str(),
            )
            .with_metadata(AgentMetadata::Classification(classification)),
        )
    }
}
