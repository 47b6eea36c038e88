use serde::{Deserialize, Serialize};

use super::analyzer::{SessionArtifacts, SessionMetrics};
use super::types::{Interaction, SessionRecord};
use crate::linkography::{DesignPhase, Linkograph, Pattern};
use crate::metrics::{BaselineComparison, CognitiveMetrics, ScientificBaselines};

/// Linkograph statistics of one design phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: DesignPhase,
    pub move_count: usize,
    pub link_count: usize,
    pub link_density: f64,
    pub critical_move_ratio: f64,
}

/// The stable JSON report of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: SessionRecord,
    pub content_hash: String,
    pub linkograph: Linkograph,
    pub patterns: Vec<Pattern>,
    pub cognitive: CognitiveMetrics,
    pub baseline_comparison: BaselineComparison,
    pub metrics: SessionMetrics,
    /// Only phases the session reached.
    pub phases: Vec<PhaseSummary>,
    pub transcript: Vec<Interaction>,
}

impl SessionReport {
    /// Assemble a report from derived artefacts and the transcript.
    pub fn new(
        session: SessionRecord,
        artifacts: SessionArtifacts,
        transcript: Vec<Interaction>,
        baselines: &ScientificBaselines,
    ) -> Self {
        let phases = DesignPhase::ALL
            .into_iter()
            .filter_map(|phase| {
                let sub = artifacts.linkograph.phase_subgraph(phase);
                if sub.is_empty() {
                    return None;
                }
                Some(PhaseSummary {
                    phase,
                    move_count: sub.metrics.move_count,
                    link_count: sub.metrics.link_count,
                    link_density: sub.metrics.link_density,
                    critical_move_ratio: sub.metrics.critical_move_ratio,
                })
            })
            .collect();

        Self {
            baseline_comparison: baselines.compare(&artifacts.cognitive),
            session,
            content_hash: artifacts.content_hash,
            linkograph: artifacts.linkograph,
            patterns: artifacts.patterns,
            cognitive: artifacts.cognitive,
            metrics: artifacts.metrics,
            phases,
            transcript,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
