use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::types::{Arm, Interaction, Proficiency, SessionRecord};
use crate::agents::AgentKind;
use crate::config::{Config, LinkographyConfig, MetricsConfig};
use crate::error::{AppResult, StorageError};
use crate::linkography::{
    Author, LinkographBuilder, Linkograph, LinkographParams, Move, Pattern, PatternDetector,
};
use crate::metrics::{CognitiveMapper, CognitiveMetrics, InteractionSignals, ScientificBaselines};
use crate::routing::EngagementLevel;
use crate::storage::Storage;

/// Share of turns in which each agent ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub analysis: f64,
    pub context: f64,
    pub domain_expert: f64,
    pub socratic: f64,
    pub enhancement: f64,
}

impl AgentUsage {
    /// Usage rates over a transcript. All zero for an empty one.
    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        if interactions.is_empty() {
            return Self::default();
        }
        let n = interactions.len() as f64;
        let rate = |agent| interactions.iter().filter(|i| i.invoked(agent)).count() as f64 / n;
        Self {
            analysis: rate(AgentKind::Analysis),
            context: rate(AgentKind::Context),
            domain_expert: rate(AgentKind::DomainExpert),
            socratic: rate(AgentKind::Socratic),
            enhancement: rate(AgentKind::Enhancement),
        }
    }
}

/// Per-session roll-up, one row of the master session table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub arm: Arm,
    pub proficiency: Proficiency,
    pub total_interactions: usize,
    pub move_count: usize,
    pub duration_minutes: f64,
    pub cognitive: CognitiveMetrics,
    /// Share of turns not classified as low engagement.
    pub engagement_rate: f64,
    /// Mean relative improvement over the tutoring baselines.
    pub improvement_score: f64,
    pub agent_usage: AgentUsage,
}

/// Everything derived from a session's moves and transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifacts {
    /// Hash of the inputs the artefacts were derived from.
    pub content_hash: String,
    pub linkograph: Linkograph,
    pub patterns: Vec<Pattern>,
    pub cognitive: CognitiveMetrics,
    pub metrics: SessionMetrics,
}

/// Interaction signals the cognitive mapper reads. Turns rejected before
/// classification carry no signal.
pub fn interaction_signals(interactions: &[Interaction]) -> InteractionSignals {
    InteractionSignals {
        turns: interactions
            .iter()
            .filter(|i| i.classification.is_some())
            .map(|i| i.signal.clone())
            .collect(),
    }
}

/// Derives linkograph, patterns and metrics for stored sessions.
#[derive(Debug, Clone)]
pub struct SessionAnalyzer {
    builder: LinkographBuilder,
    mapper: CognitiveMapper,
    metrics: MetricsConfig,
    baselines: ScientificBaselines,
    include_tutor_moves: bool,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        Self::new(&LinkographyConfig::default(), MetricsConfig::default())
    }
}

impl SessionAnalyzer {
    /// Create an analyzer from the linkograph and metric settings
    pub fn new(linkography: &LinkographyConfig, metrics: MetricsConfig) -> Self {
        Self {
            builder: LinkographBuilder::new(LinkographParams::from(linkography)),
            mapper: CognitiveMapper::new(metrics.clone()),
            metrics,
            baselines: ScientificBaselines::default(),
            include_tutor_moves: linkography.include_tutor_moves,
        }
    }

    /// Create an analyzer from the full configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.linkography, config.metrics.clone())
    }

    /// Baselines used for the improvement score.
    pub fn baselines(&self) -> &ScientificBaselines {
        &self.baselines
    }

    /// SHA-256 over the move list, the interaction ids and every setting
    /// that shapes the artefacts, hex encoded. Changing a linkograph or
    /// metric setting invalidates cached artefacts.
    pub fn content_hash(&self, moves: &[Move], interactions: &[Interaction]) -> String {
        let mut hasher = Sha256::new();
        for m in moves {
            hasher.update(m.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(m.index.to_le_bytes());
            hasher.update(m.author.as_str().as_bytes());
            hasher.update(m.phase.as_str().as_bytes());
            hasher.update(m.text.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(b"--");
        for i in interactions {
            hasher.update(i.id.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(b"--");
        self.hash_settings(&mut hasher);
        format!("{:x}", hasher.finalize())
    }

    fn hash_settings(&self, hasher: &mut Sha256) {
        let p = self.builder.params();
        let m = &self.metrics;
        for value in [
            p.similarity_threshold,
            p.lateral_strong,
            p.chunk_density,
            m.link_density_max,
            m.web_count_max,
            m.chunk_count_max,
            m.progression_gain,
            m.self_correction_weight,
        ] {
            hasher.update(value.to_bits().to_le_bytes());
        }
        for value in [
            p.max_link_range,
            p.lateral_window,
            p.critical_threshold,
            p.chunk_window,
            m.long_range_min,
            m.progression_window,
        ] {
            hasher.update((value as u64).to_le_bytes());
        }
        hasher.update([u8::from(self.include_tutor_moves)]);
    }

    /// Moves that enter the linkograph.
    pub fn linkograph_moves(&self, moves: &[Move]) -> Vec<Move> {
        moves
            .iter()
            .filter(|m| self.include_tutor_moves || m.author == Author::Student)
            .cloned()
            .collect()
    }

    /// Derive all artefacts from stored moves (with their embeddings) and
    /// the transcript. Pure.
    pub fn derive(
        &self,
        session: &SessionRecord,
        moves: &[Move],
        interactions: &[Interaction],
    ) -> SessionArtifacts {
        let graph_moves = self.linkograph_moves(moves);
        let embeddings: Vec<Option<Vec<f32>>> =
            graph_moves.iter().map(|m| m.embedding.clone()).collect();
        let slices: Vec<Option<&[f32]>> = embeddings.iter().map(|e| e.as_deref()).collect();
        let linkograph = self.builder.build_with_embeddings(graph_moves, &slices);

        let patterns = PatternDetector::for_graph(&linkograph).detect(&linkograph);
        let signals = interaction_signals(interactions);
        let cognitive = self.mapper.map(&linkograph, &patterns, Some(&signals));
        let metrics = self.session_metrics(session, moves, interactions, &cognitive);

        debug!(
            session_id = %session.id,
            moves = linkograph.len(),
            links = linkograph.links.len(),
            patterns = patterns.len(),
            "Session artefacts derived"
        );

        SessionArtifacts {
            content_hash: self.content_hash(moves, interactions),
            linkograph,
            patterns,
            cognitive,
            metrics,
        }
    }

    fn session_metrics(
        &self,
        session: &SessionRecord,
        moves: &[Move],
        interactions: &[Interaction],
        cognitive: &CognitiveMetrics,
    ) -> SessionMetrics {
        let duration_minutes = match (moves.first(), moves.last()) {
            (Some(first), Some(last)) if moves.len() > 1 => {
                (last.timestamp - first.timestamp).num_milliseconds().max(0) as f64 / 60_000.0
            }
            _ => 0.0,
        };

        let engagement_rate = if interactions.is_empty() {
            0.0
        } else {
            let engaged = interactions
                .iter()
                .filter(|i| {
                    i.classification
                        .as_ref()
                        .map_or(false, |c| c.engagement_level != EngagementLevel::Low)
                })
                .count();
            engaged as f64 / interactions.len() as f64
        };

        SessionMetrics {
            session_id: session.id.clone(),
            arm: session.arm,
            proficiency: session.proficiency,
            total_interactions: interactions.len(),
            move_count: moves.len(),
            duration_minutes,
            cognitive: *cognitive,
            engagement_rate,
            improvement_score: self.baselines.compare(cognitive).overall_improvement,
            agent_usage: AgentUsage::from_interactions(interactions),
        }
    }

    /// Load the session's artefacts, deriving and caching them when the
    /// stored copy is missing or stale.
    pub async fn load_or_derive(
        &self,
        store: &dyn Storage,
        session_id: &str,
    ) -> AppResult<(SessionRecord, SessionArtifacts, Vec<Interaction>)> {
        let session = store
            .get_session(session_id)
            .await?
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        let moves = store.get_moves(session_id).await?;
        let interactions = store.get_interactions(session_id).await?;
        let hash = self.content_hash(&moves, &interactions);

        if let Some(mut cached) = store.get_artifacts(session_id, &hash).await? {
            debug!(session_id, "Using cached session artefacts");
            cached.linkograph.params = self.builder.params().clone();
            return Ok((session, cached, interactions));
        }

        let artifacts = self.derive(&session, &moves, &interactions);
        store.put_artifacts(session_id, &artifacts).await?;
        info!(
            session_id,
            overall = artifacts.cognitive.overall,
            "Session artefacts cached"
        );
        Ok((session, artifacts, interactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkography::DesignPhase;
    use crate::routing::Classification;
    use chrono::{Duration, Utc};

    fn moves() -> Vec<Move> {
        let start = Utc::now();
        (0..4)
            .map(|i| {
                let author = if i % 2 == 0 { Author::Student } else { Author::Tutor };
                let mut m = Move::new(i, author, format!("move {}", i), DesignPhase::Ideation)
                    .with_timestamp(start + Duration::minutes(i as i64 * 2));
                m.embedding = Some(vec![1.0, 0.0]);
                m
            })
            .collect()
    }

    fn interaction(session: &SessionRecord, turn: usize, engagement: EngagementLevel) -> Interaction {
        let mut i = Interaction::new(&session.id, turn, "x");
        i.classification = Some(Classification {
            engagement_level: engagement,
            ..Classification::default()
        });
        i.agents_invoked = vec![AgentKind::Context, AgentKind::Socratic];
        i
    }

    #[test]
    fn test_derive_rolls_up_session() {
        let session = SessionRecord::new(Arm::Mentor, Proficiency::Beginner, "library");
        let moves = moves();
        let interactions = vec![
            interaction(&session, 0, EngagementLevel::High),
            interaction(&session, 1, EngagementLevel::Low),
        ];
        let artifacts = SessionAnalyzer::default().derive(&session, &moves, &interactions);

        assert_eq!(artifacts.linkograph.len(), 4);
        // All four moves share a vector, so every pair links.
        assert_eq!(artifacts.linkograph.links.len(), 6);
        let m = &artifacts.metrics;
        assert_eq!(m.total_interactions, 2);
        assert_eq!(m.move_count, 4);
        assert!((m.duration_minutes - 6.0).abs() < 1e-9);
        assert!((m.engagement_rate - 0.5).abs() < 1e-12);
        assert!((m.agent_usage.socratic - 1.0).abs() < 1e-12);
        assert_eq!(m.agent_usage.domain_expert, 0.0);
    }

    #[test]
    fn test_student_only_linkograph() {
        let config = LinkographyConfig {
            include_tutor_moves: false,
            ..LinkographyConfig::default()
        };
        let analyzer = SessionAnalyzer::new(&config, MetricsConfig::default());
        let session = SessionRecord::new(Arm::Control, Proficiency::Expert, "");
        let artifacts = analyzer.derive(&session, &moves(), &[]);
        assert_eq!(artifacts.linkograph.len(), 2);
        assert_eq!(artifacts.metrics.move_count, 4);
    }

    #[test]
    fn test_content_hash_changes_with_inputs() {
        let analyzer = SessionAnalyzer::default();
        let moves = moves();
        let a = analyzer.content_hash(&moves, &[]);
        assert_eq!(a, analyzer.content_hash(&moves, &[]));
        assert_eq!(a.len(), 64);
        assert_ne!(a, analyzer.content_hash(&moves[..3], &[]));
    }

    #[test]
    fn test_content_hash_changes_with_settings() {
        let moves = moves();
        let base = SessionAnalyzer::default().content_hash(&moves, &[]);

        let stricter = LinkographyConfig {
            similarity_threshold: 0.8,
            ..LinkographyConfig::default()
        };
        let linked = SessionAnalyzer::new(&stricter, MetricsConfig::default());
        assert_ne!(base, linked.content_hash(&moves, &[]));

        let metrics = MetricsConfig {
            progression_window: 7,
            ..MetricsConfig::default()
        };
        let mapped = SessionAnalyzer::new(&LinkographyConfig::default(), metrics);
        assert_ne!(base, mapped.content_hash(&moves, &[]));

        let students = LinkographyConfig {
            include_tutor_moves: false,
            ..LinkographyConfig::default()
        };
        let filtered = SessionAnalyzer::new(&students, MetricsConfig::default());
        assert_ne!(base, filtered.content_hash(&moves, &[]));
    }

    #[test]
    fn test_empty_session() {
        let session = SessionRecord::new(Arm::GenericAi, Proficiency::Advanced, "");
        let artifacts = SessionAnalyzer::default().derive(&session, &[], &[]);
        assert!(artifacts.patterns.is_empty());
        assert_eq!(artifacts.cognitive, CognitiveMetrics::zeroed());
        assert_eq!(artifacts.metrics.duration_minutes, 0.0);
    }
}
