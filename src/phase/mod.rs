//! Phase/step tracker.
//!
//! A forward-only state machine over design phase × learning step. The
//! tracker is advisory: each observed turn yields a [`PhaseAssessment`]
//! that agents use to shape their prompts.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::linkography::DesignPhase;
use crate::text::{keyword_hits, word_count};

/// Minimum words for a turn to cover a step on its own.
pub const DEFAULT_MIN_STEP_WORDS: usize = 8;

/// Learning step within a design phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStep {
    /// Establishing the site, users and brief.
    #[default]
    InitialContextReasoning,
    /// Bringing knowledge and precedent to bear.
    KnowledgeSynthesisTrigger,
    /// Probing the reasoning with questions.
    SocraticQuestioning,
    /// Reflecting on one's own process.
    MetacognitivePrompt,
}

impl LearningStep {
    /// All steps in order.
    pub const ALL: [LearningStep; 4] = [
        LearningStep::InitialContextReasoning,
        LearningStep::KnowledgeSynthesisTrigger,
        LearningStep::SocraticQuestioning,
        LearningStep::MetacognitivePrompt,
    ];

    /// Get the step name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStep::InitialContextReasoning => "initial_context_reasoning",
            LearningStep::KnowledgeSynthesisTrigger => "knowledge_synthesis_trigger",
            LearningStep::SocraticQuestioning => "socratic_questioning",
            LearningStep::MetacognitivePrompt => "metacognitive_prompt",
        }
    }

    /// The step after this one, if any.
    pub fn next(&self) -> Option<LearningStep> {
        match self {
            LearningStep::InitialContextReasoning => Some(LearningStep::KnowledgeSynthesisTrigger),
            LearningStep::KnowledgeSynthesisTrigger => Some(LearningStep::SocraticQuestioning),
            LearningStep::SocraticQuestioning => Some(LearningStep::MetacognitivePrompt),
            LearningStep::MetacognitivePrompt => None,
        }
    }

    fn position(&self) -> usize {
        match self {
            LearningStep::InitialContextReasoning => 0,
            LearningStep::KnowledgeSynthesisTrigger => 1,
            LearningStep::SocraticQuestioning => 2,
            LearningStep::MetacognitivePrompt => 3,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            LearningStep::InitialContextReasoning => &[
                "site", "context", "user", "program", "brief", "client", "community", "need",
                "neighbourhood", "neighborhood", "climate",
            ],
            LearningStep::KnowledgeSynthesisTrigger => &[
                "combine", "connect", "relate", "integrat*", "precedent", "knowledge", "because",
                "principle", "strategy",
            ],
            LearningStep::SocraticQuestioning => &[
                "why", "how", "what if", "question", "wonder", "?", "whether",
            ],
            LearningStep::MetacognitivePrompt => &[
                "i think", "i realise", "i realize", "reflect*", "learned", "my approach",
                "my process", "i notice", "looking back",
            ],
        }
    }
}

impl std::fmt::Display for LearningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LearningStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LearningStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown learning step: {}", s))
    }
}

fn phase_keywords(phase: DesignPhase) -> &'static [&'static str] {
    match phase {
        DesignPhase::Ideation => &[
            "idea", "concept", "explor*", "vision", "brainstorm", "approach", "program", "site",
        ],
        DesignPhase::Visualisation => &[
            "sketch*", "drawing", "plan", "section", "elevation", "model", "diagram", "layout",
            "render*",
        ],
        DesignPhase::Materialisation => &[
            "material*", "structure", "construction", "detail*", "timber", "steel", "concrete",
            "facade", "assembly",
        ],
    }
}

/// Minimum cumulative student moves before leaving a phase.
pub fn phase_floor(phase: DesignPhase) -> Option<usize> {
    match phase {
        DesignPhase::Ideation => Some(4),
        DesignPhase::Visualisation => Some(8),
        DesignPhase::Materialisation => None,
    }
}

/// Tracker output for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseAssessment {
    pub phase: DesignPhase,
    pub step: LearningStep,
    /// How strongly recent evidence supports the state, in [0, 1].
    pub confidence: f64,
}

impl Default for PhaseAssessment {
    fn default() -> Self {
        Self {
            phase: DesignPhase::Ideation,
            step: LearningStep::InitialContextReasoning,
            confidence: 0.0,
        }
    }
}

/// Forward-only phase × step state machine.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: DesignPhase,
    step: LearningStep,
    visited: [bool; 4],
    student_moves: usize,
    min_step_words: usize,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STEP_WORDS)
    }
}

impl PhaseTracker {
    /// Start at (ideation, initial_context_reasoning).
    pub fn new(min_step_words: usize) -> Self {
        Self {
            phase: DesignPhase::Ideation,
            step: LearningStep::InitialContextReasoning,
            visited: [true, false, false, false],
            student_moves: 0,
            min_step_words,
        }
    }

    /// Rebuild the tracker of a stored session from its last recorded state.
    pub fn resume(
        min_step_words: usize,
        phase: DesignPhase,
        step: LearningStep,
        student_moves: usize,
    ) -> Self {
        let mut visited = [false; 4];
        for seen in visited.iter_mut().take(step.position() + 1) {
            *seen = true;
        }
        Self {
            phase,
            step,
            visited,
            student_moves,
            min_step_words,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> DesignPhase {
        self.phase
    }

    /// Current step.
    pub fn step(&self) -> LearningStep {
        self.step
    }

    /// Student moves observed so far.
    pub fn student_moves(&self) -> usize {
        self.student_moves
    }

    /// Current state without observing anything.
    pub fn assessment(&self) -> PhaseAssessment {
        PhaseAssessment {
            phase: self.phase,
            step: self.step,
            confidence: self.visited_share() * 0.5,
        }
    }

    /// Whether a turn covers the current step: the orchestrator flagged it,
    /// or the text is long enough and mentions one of the step's keywords.
    pub fn covers_step(&self, text: &str, flagged: Option<LearningStep>) -> bool {
        if flagged == Some(self.step) {
            return true;
        }
        word_count(text) >= self.min_step_words && keyword_hits(text, self.step.keywords()) > 0
    }

    /// Observe one student turn and return the resulting state.
    pub fn observe(&mut self, text: &str, flagged: Option<LearningStep>) -> PhaseAssessment {
        self.student_moves += 1;

        if self.covers_step(text, flagged) {
            if let Some(next) = self.step.next() {
                debug!(from = %self.step, to = %next, "Learning step advanced");
                self.step = next;
                self.visited[next.position()] = true;
            }
        }

        let all_visited = self.visited.iter().all(|v| *v);
        if let (true, Some(floor), Some(next_phase)) =
            (all_visited, phase_floor(self.phase), self.phase.next())
        {
            if self.student_moves >= floor {
                info!(
                    from = %self.phase,
                    to = %next_phase,
                    student_moves = self.student_moves,
                    "Design phase advanced"
                );
                self.phase = next_phase;
                self.step = LearningStep::InitialContextReasoning;
                self.visited = [true, false, false, false];
            }
        }

        let evidence = (keyword_hits(text, phase_keywords(self.phase)).min(3) as f64) / 3.0;
        PhaseAssessment {
            phase: self.phase,
            step: self.step,
            confidence: (self.visited_share() * 0.5 + evidence * 0.5).clamp(0.0, 1.0),
        }
    }

    fn visited_share(&self) -> f64 {
        self.visited.iter().filter(|v| **v).count() as f64 / 4.0
    }
}
