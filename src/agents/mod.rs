//! Agent kernel and the five specialised tutoring agents.
//!
//! Every agent implements [`Agent`] and holds what it needs by composition:
//! the LLM-backed agents get an [`AgentKernel`], which is their only path to
//! the model. Agents never return errors; a failure is reported as
//! [`AgentOutcome::Degraded`] and the orchestrator decides what the learner
//! sees.

mod analysis;
mod context;
mod domain;
mod enhancement;
mod kernel;
mod safety;
mod socratic;
mod telemetry;
mod types;

pub use analysis::{AnalysisAgent, AnalysisSummary, PhaseAnalysis, VisualAnalysis, VisualAnalyzer};
pub use context::ContextAgent;
pub use domain::{find_references, DomainExpert, Reference, REFERENCES};
pub use enhancement::{estimate_response_metrics, strip_offloading, CognitiveEnhancementAgent};
pub use kernel::AgentKernel;
pub use safety::{SafetyValidator, SafetyVerdict};
pub use socratic::{template_question, validate_question, SocraticTutor, MAX_QUESTION_WORDS};
pub use telemetry::{TelemetryEvent, TelemetryKind, TelemetrySink};
pub use types::{
    Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, CognitiveFlag,
    ResponseType, SessionView,
};
