//! Sessions: stored records, the append-only transcript and everything
//! derived from it.
//!
//! Derived artefacts (linkograph, patterns, metrics) are never edited in
//! place. [`SessionAnalyzer::load_or_derive`] recomputes them from the moves
//! and interactions whenever the content hash changes, which covers the
//! linkograph and metric settings as well as the transcript.

mod analyzer;
mod report;
mod types;

pub use analyzer::{
    interaction_signals, AgentUsage, SessionAnalyzer, SessionArtifacts, SessionMetrics,
};
pub use report::{PhaseSummary, SessionReport};
pub use types::{guidance_fit, Arm, Interaction, Proficiency, SessionRecord};
