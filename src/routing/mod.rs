//! Classification vocabulary and the route selector.
//!
//! [`select_route`] is a pure function of a [`Classification`]: the first
//! matching rule wins, ambiguous classifications fall back to balanced
//! guidance.

use serde::{Deserialize, Serialize};

use crate::text::{ends_with_question, question_count, strip_questions};

/// What kind of turn the learner produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Expressed confusion or being stuck.
    Confusion,
    /// Direct factual or technical question.
    KnowledgeRequest,
    /// Asked for help shaping the design.
    DesignGuidance,
    /// Asked for an opinion on their work.
    FeedbackRequest,
    /// Described or developed their own design idea.
    #[default]
    DesignExploration,
}

impl InteractionType {
    /// Get the type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Confusion => "confusion",
            InteractionType::KnowledgeRequest => "knowledge_request",
            InteractionType::DesignGuidance => "design_guidance",
            InteractionType::FeedbackRequest => "feedback_request",
            InteractionType::DesignExploration => "design_exploration",
        }
    }
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse understanding level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandingLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl UnderstandingLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            UnderstandingLevel::Low => "low",
            UnderstandingLevel::Medium => "medium",
            UnderstandingLevel::High => "high",
        }
    }

    /// Numeric score: 0, 0.5 or 1.
    pub fn score(&self) -> f64 {
        match self {
            UnderstandingLevel::Low => 0.0,
            UnderstandingLevel::Medium => 0.5,
            UnderstandingLevel::High => 1.0,
        }
    }
}

impl std::fmt::Display for UnderstandingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Learner's confidence as expressed in the turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Uncertain,
    #[default]
    Confident,
    Overconfident,
}

impl ConfidenceLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Uncertain => "uncertain",
            ConfidenceLevel::Confident => "confident",
            ConfidenceLevel::Overconfident => "overconfident",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much effort the learner is putting in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl EngagementLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }
}

/// Pedagogical strategy for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Guidance, no question.
    SupportiveScaffolding,
    /// Technical content, no question.
    KnowledgeOnly,
    /// Guidance followed by exactly one question.
    #[default]
    BalancedGuidance,
    /// One exploratory question.
    SocraticExploration,
    /// One challenging question.
    CognitiveChallenge,
}

/// Question rules a reply must follow on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPolicy {
    /// No question at all.
    NoQuestion,
    /// Non-question guidance, then exactly one closing question.
    GuidanceThenOneQuestion,
    /// Exactly one question.
    OneQuestion,
}

impl QuestionPolicy {
    /// Whether a reply follows the policy.
    pub fn complies(&self, reply: &str) -> bool {
        let questions = question_count(reply);
        match self {
            QuestionPolicy::NoQuestion => questions == 0,
            QuestionPolicy::OneQuestion => questions == 1,
            QuestionPolicy::GuidanceThenOneQuestion => {
                questions == 1
                    && ends_with_question(reply)
                    && !strip_questions(reply).trim().is_empty()
            }
        }
    }
}

impl Route {
    /// All routes.
    pub const ALL: [Route; 5] = [
        Route::SupportiveScaffolding,
        Route::KnowledgeOnly,
        Route::BalancedGuidance,
        Route::SocraticExploration,
        Route::CognitiveChallenge,
    ];

    /// Get the route name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::SupportiveScaffolding => "supportive_scaffolding",
            Route::KnowledgeOnly => "knowledge_only",
            Route::BalancedGuidance => "balanced_guidance",
            Route::SocraticExploration => "socratic_exploration",
            Route::CognitiveChallenge => "cognitive_challenge",
        }
    }

    /// Question rules on this route.
    pub fn question_policy(&self) -> QuestionPolicy {
        match self {
            Route::SupportiveScaffolding | Route::KnowledgeOnly => QuestionPolicy::NoQuestion,
            Route::BalancedGuidance => QuestionPolicy::GuidanceThenOneQuestion,
            Route::SocraticExploration | Route::CognitiveChallenge => QuestionPolicy::OneQuestion,
        }
    }

    /// Whether the domain expert runs on this route.
    pub fn needs_domain_expert(&self) -> bool {
        matches!(
            self,
            Route::SupportiveScaffolding | Route::KnowledgeOnly | Route::BalancedGuidance
        )
    }

    /// Whether the Socratic tutor runs on this route.
    pub fn needs_socratic_tutor(&self) -> bool {
        !matches!(self, Route::KnowledgeOnly)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|r| r.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown route: {}", s))
    }
}

/// Context classifier output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub interaction_type: InteractionType,
    pub understanding_level: UnderstandingLevel,
    pub confidence_level: ConfidenceLevel,
    pub engagement_level: EngagementLevel,
    /// Contradictory signals were present.
    pub ambiguous: bool,
    /// Route chosen by [`select_route`].
    pub routing_path: Route,
}

/// Route plus the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub route: Route,
    pub reason: &'static str,
    pub ambiguous: bool,
}

/// Map a classification to a route. Rules are tried in order.
pub fn select_route(c: &Classification) -> RouteDecision {
    let decide = |route, reason| RouteDecision {
        route,
        reason,
        ambiguous: c.ambiguous,
    };

    if c.ambiguous {
        return decide(Route::BalancedGuidance, "ambiguous classification");
    }
    if c.confidence_level == ConfidenceLevel::Uncertain
        || c.understanding_level == UnderstandingLevel::Low
    {
        return decide(Route::SupportiveScaffolding, "uncertain or low understanding");
    }
    if c.interaction_type == InteractionType::KnowledgeRequest
        && c.confidence_level == ConfidenceLevel::Confident
    {
        return decide(Route::KnowledgeOnly, "direct factual question");
    }
    if c.interaction_type == InteractionType::DesignGuidance {
        return decide(Route::BalancedGuidance, "design guidance request");
    }
    if c.confidence_level == ConfidenceLevel::Confident
        && c.understanding_level >= UnderstandingLevel::Medium
    {
        return decide(Route::SocraticExploration, "confident with working understanding");
    }
    if c.confidence_level == ConfidenceLevel::Overconfident
        || c.engagement_level == EngagementLevel::Low
    {
        return decide(Route::CognitiveChallenge, "overconfident or disengaged");
    }
    decide(Route::BalancedGuidance, "default")
}
