use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MetricsConfig;
use crate::linkography::{count_kind, Author, LinkKind, Linkograph, MoveType, Pattern, PatternKind};
use crate::text::self_corrections;

/// The six cognitive dimensions, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveMetric {
    CognitiveOffloadingPrevention,
    DeepThinkingEngagement,
    ScaffoldingEffectiveness,
    KnowledgeIntegration,
    LearningProgression,
    MetacognitiveAwareness,
}

impl CognitiveMetric {
    /// All metrics in canonical order.
    pub const ALL: [CognitiveMetric; 6] = [
        CognitiveMetric::CognitiveOffloadingPrevention,
        CognitiveMetric::DeepThinkingEngagement,
        CognitiveMetric::ScaffoldingEffectiveness,
        CognitiveMetric::KnowledgeIntegration,
        CognitiveMetric::LearningProgression,
        CognitiveMetric::MetacognitiveAwareness,
    ];

    /// Get the metric name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveMetric::CognitiveOffloadingPrevention => "cognitive_offloading_prevention",
            CognitiveMetric::DeepThinkingEngagement => "deep_thinking_engagement",
            CognitiveMetric::ScaffoldingEffectiveness => "scaffolding_effectiveness",
            CognitiveMetric::KnowledgeIntegration => "knowledge_integration",
            CognitiveMetric::LearningProgression => "learning_progression",
            CognitiveMetric::MetacognitiveAwareness => "metacognitive_awareness",
        }
    }
}

impl std::fmt::Display for CognitiveMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Six scores in [0, 1] plus their mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitiveMetrics {
    pub cognitive_offloading_prevention: f64,
    pub deep_thinking_engagement: f64,
    pub scaffolding_effectiveness: f64,
    pub knowledge_integration: f64,
    pub learning_progression: f64,
    pub metacognitive_awareness: f64,
    /// Arithmetic mean of the six.
    pub overall: f64,
}

impl CognitiveMetrics {
    /// All scores zero.
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Build from the six scores; clamps each and fills in `overall`.
    pub fn from_scores(
        cognitive_offloading_prevention: f64,
        deep_thinking_engagement: f64,
        scaffolding_effectiveness: f64,
        knowledge_integration: f64,
        learning_progression: f64,
        metacognitive_awareness: f64,
    ) -> Self {
        let mut metrics = Self {
            cognitive_offloading_prevention: unit(cognitive_offloading_prevention),
            deep_thinking_engagement: unit(deep_thinking_engagement),
            scaffolding_effectiveness: unit(scaffolding_effectiveness),
            knowledge_integration: unit(knowledge_integration),
            learning_progression: unit(learning_progression),
            metacognitive_awareness: unit(metacognitive_awareness),
            overall: 0.0,
        };
        metrics.overall = CognitiveMetric::ALL
            .iter()
            .map(|m| metrics.get(*m))
            .sum::<f64>()
            / 6.0;
        metrics
    }

    /// Score of one dimension.
    pub fn get(&self, metric: CognitiveMetric) -> f64 {
        match metric {
            CognitiveMetric::CognitiveOffloadingPrevention => self.cognitive_offloading_prevention,
            CognitiveMetric::DeepThinkingEngagement => self.deep_thinking_engagement,
            CognitiveMetric::ScaffoldingEffectiveness => self.scaffolding_effectiveness,
            CognitiveMetric::KnowledgeIntegration => self.knowledge_integration,
            CognitiveMetric::LearningProgression => self.learning_progression,
            CognitiveMetric::MetacognitiveAwareness => self.metacognitive_awareness,
        }
    }
}

/// Per-turn counters the orchestrator records for the mapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSignal {
    /// Whether the reply honoured the question policy of the route the
    /// learner's state called for.
    pub route_appropriate: bool,
    /// Fit of the reply's amount of guidance to the learner's proficiency, [0, 1].
    pub guidance_fit: f64,
    /// Classified understanding: 0 low, 0.5 medium, 1 high.
    pub understanding: f64,
    /// Whether the tutor asked a question.
    pub tutor_question: bool,
}

/// Interaction-level input to the mapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionSignals {
    pub turns: Vec<TurnSignal>,
}

impl InteractionSignals {
    /// Turns in which the tutor asked a question.
    pub fn question_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.tutor_question).count()
    }

    /// Turns in which the tutor answered without asking.
    pub fn answer_turns(&self) -> usize {
        self.turns.len() - self.question_turns()
    }
}

/// Projects linkographic structure and interaction signals onto the six
/// cognitive metrics. Pure: identical inputs give bit-identical outputs.
#[derive(Debug, Clone, Default)]
pub struct CognitiveMapper {
    config: MetricsConfig,
}

impl CognitiveMapper {
    /// Create a mapper with the given normalisation constants
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Compute the metrics for one linkograph snapshot.
    pub fn map(
        &self,
        graph: &Linkograph,
        patterns: &[Pattern],
        signals: Option<&InteractionSignals>,
    ) -> CognitiveMetrics {
        if graph.is_empty() {
            return CognitiveMetrics::zeroed();
        }

        let metrics = CognitiveMetrics::from_scores(
            self.offloading_prevention(graph),
            self.deep_thinking(graph, patterns),
            self.scaffolding(graph, signals),
            self.knowledge_integration(graph, patterns),
            self.learning_progression(graph),
            self.metacognition(graph),
        );
        debug!(
            moves = graph.len(),
            overall = metrics.overall,
            "Cognitive metrics computed"
        );
        metrics
    }

    fn link_density_norm(&self, graph: &Linkograph) -> f64 {
        norm(graph.metrics.link_density, self.config.link_density_max)
    }

    /// 1 - (0.40 orphan - 0.30 range_norm - 0.30 (1 - density_norm)), clamped.
    fn offloading_prevention(&self, graph: &Linkograph) -> f64 {
        let range_norm = norm(
            graph.metrics.average_link_range,
            graph.params().max_link_range as f64,
        );
        let density_norm = self.link_density_norm(graph);
        1.0 - (0.40 * graph.metrics.orphan_ratio
            - 0.30 * range_norm
            - 0.30 * (1.0 - density_norm))
    }

    fn deep_thinking(&self, graph: &Linkograph, patterns: &[Pattern]) -> f64 {
        let webs = norm(
            count_kind(patterns, PatternKind::Web) as f64,
            self.config.web_count_max,
        );
        let chunks = norm(
            count_kind(patterns, PatternKind::Chunk) as f64,
            self.config.chunk_count_max,
        );
        0.30 * self.link_density_norm(graph)
            + 0.25 * webs
            + 0.25 * graph.metrics.critical_move_ratio
            + 0.20 * chunks
    }

    fn knowledge_integration(&self, graph: &Linkograph, patterns: &[Pattern]) -> f64 {
        let links = &graph.links;
        let critical = &graph.metrics.critical_moves;

        let backlinked_critical = if critical.is_empty() {
            0.0
        } else {
            let revisited = critical
                .iter()
                .filter(|&&c| {
                    links
                        .iter()
                        .any(|l| l.source == c && l.kind == LinkKind::Backward)
                })
                .count();
            revisited as f64 / critical.len() as f64
        };

        let (long_range, cross_phase) = if links.is_empty() {
            (0.0, 0.0)
        } else {
            let long = links
                .iter()
                .filter(|l| l.range() >= self.config.long_range_min)
                .count();
            let cross = links
                .iter()
                .filter(|l| graph.moves[l.source].phase != graph.moves[l.target].phase)
                .count();
            (
                long as f64 / links.len() as f64,
                cross as f64 / links.len() as f64,
            )
        };

        let webs: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.kind == PatternKind::Web)
            .collect();
        let web_formation = if webs.is_empty() {
            0.0
        } else {
            webs.iter().map(|p| p.strength).sum::<f64>() / webs.len() as f64
        };

        0.30 * backlinked_critical + 0.30 * long_range + 0.20 * web_formation + 0.20 * cross_phase
    }

    /// Weighted 0.4 / 0.3 / 0.3 mean of route appropriateness, guidance fit
    /// and post-guidance improvement. Without signals, the share of student
    /// moves that take up an earlier tutor move stands in.
    fn scaffolding(&self, graph: &Linkograph, signals: Option<&InteractionSignals>) -> f64 {
        let turns = match signals {
            Some(s) if !s.turns.is_empty() => &s.turns,
            _ => return guidance_uptake(graph),
        };

        let n = turns.len() as f64;
        let appropriate = turns.iter().filter(|t| t.route_appropriate).count() as f64 / n;
        let fit = turns.iter().map(|t| unit(t.guidance_fit)).sum::<f64>() / n;
        let improvement = if turns.len() < 2 {
            0.5
        } else {
            let steps: f64 = turns
                .windows(2)
                .map(|w| {
                    if w[1].understanding > w[0].understanding {
                        1.0
                    } else if w[1].understanding < w[0].understanding {
                        0.0
                    } else {
                        0.5
                    }
                })
                .sum();
            steps / (turns.len() - 1) as f64
        };

        0.4 * appropriate + 0.3 * fit + 0.3 * improvement
    }

    /// Sigmoid of the least-squares slope of a rolling mean of per-move
    /// competence proxies.
    fn learning_progression(&self, graph: &Linkograph) -> f64 {
        let indices = learner_moves(graph);
        let critical = graph.params().critical_threshold.max(1) as f64;
        let proxies: Vec<f64> = indices
            .iter()
            .map(|&i| {
                let m = &graph.moves[i];
                let connectivity = (graph.metrics.degree(i) as f64 / critical).min(1.0);
                let elaboration = (m.word_count() as f64 / 40.0).min(1.0);
                0.5 * connectivity + 0.3 * elaboration + 0.2 * move_type_weight(m.move_type)
            })
            .collect();

        let window = self.config.progression_window.max(1);
        if proxies.len() < 2 {
            return 0.5;
        }
        let rolling: Vec<f64> = (0..proxies.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(window);
                let slice = &proxies[start..=i];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect();

        let slope = least_squares_slope(&rolling);
        1.0 / (1.0 + (-self.config.progression_gain * slope).exp())
    }

    /// Share of reflective learner moves plus weighted self-corrections.
    fn metacognition(&self, graph: &Linkograph) -> f64 {
        let indices = learner_moves(graph);
        if indices.is_empty() {
            return 0.0;
        }
        let reflective = indices
            .iter()
            .filter(|&&i| graph.moves[i].move_type == MoveType::Reflection)
            .count();
        let corrections: usize = indices
            .iter()
            .map(|&i| self_corrections(&graph.moves[i].text))
            .sum();
        reflective as f64 / indices.len() as f64
            + self.config.self_correction_weight * corrections as f64
    }
}

/// Student move indices, or all moves when no student move exists.
fn learner_moves(graph: &Linkograph) -> Vec<usize> {
    let students: Vec<usize> = graph
        .moves
        .iter()
        .filter(|m| m.author == Author::Student)
        .map(|m| m.index)
        .collect();
    if students.is_empty() {
        (0..graph.len()).collect()
    } else {
        students
    }
}

/// Fraction of student moves linked back to an earlier tutor move.
fn guidance_uptake(graph: &Linkograph) -> f64 {
    let students: Vec<usize> = graph
        .moves
        .iter()
        .filter(|m| m.author == Author::Student && m.index > 0)
        .map(|m| m.index)
        .collect();
    if students.is_empty() {
        return 0.0;
    }
    let taken_up = students
        .iter()
        .filter(|&&s| {
            graph
                .links
                .iter()
                .any(|l| l.target == s && graph.moves[l.source].author == Author::Tutor)
        })
        .count();
    taken_up as f64 / students.len() as f64
}

fn move_type_weight(move_type: MoveType) -> f64 {
    match move_type {
        MoveType::Analysis => 0.2,
        MoveType::Synthesis => 0.6,
        MoveType::Transformation => 0.7,
        MoveType::Evaluation => 0.8,
        MoveType::Reflection => 1.0,
    }
}

fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn norm(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    unit(value / max)
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkography::{DesignPhase, LinkographBuilder, LinkographParams, Move, PatternDetector};

    fn axis(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    fn graph(groups: &[usize], texts: &[&str]) -> Linkograph {
        let dim = groups.iter().copied().max().unwrap_or(0) + 1;
        let vectors: Vec<Vec<f32>> = groups.iter().map(|&g| axis(dim, g)).collect();
        let refs: Vec<Option<&[f32]>> = vectors.iter().map(|v| Some(v.as_slice())).collect();
        let moves: Vec<Move> = groups
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let text = texts.get(i).copied().unwrap_or("the site slopes south");
                Move::new(i, Author::Student, text, DesignPhase::Ideation)
            })
            .collect();
        LinkographBuilder::default().build_with_embeddings(moves, &refs)
    }

    fn assert_in_unit(m: &CognitiveMetrics) {
        for metric in CognitiveMetric::ALL {
            let v = m.get(metric);
            assert!((0.0..=1.0).contains(&v), "{} out of range: {}", metric, v);
        }
        let mean = CognitiveMetric::ALL.iter().map(|x| m.get(*x)).sum::<f64>() / 6.0;
        assert!((m.overall - mean).abs() < 1e-9);
    }

    #[test]
    fn test_empty_linkograph_is_zeroed() {
        let g = Linkograph::empty(LinkographParams::default());
        let m = CognitiveMapper::default().map(&g, &[], None);
        assert_eq!(m, CognitiveMetrics::zeroed());
    }

    #[test]
    fn test_single_move_in_range() {
        let g = graph(&[0], &[]);
        let m = CognitiveMapper::default().map(&g, &[], None);
        assert_in_unit(&m);
        assert_eq!(m.learning_progression, 0.5);
    }

    #[test]
    fn test_dense_session_scores_higher_deep_thinking() {
        let dense = graph(&[0; 8], &[]);
        let sparse = graph(&[0, 1, 2, 3, 4, 5, 6, 7], &[]);
        let mapper = CognitiveMapper::default();
        let dense_patterns = PatternDetector::for_graph(&dense).detect(&dense);
        let sparse_patterns = PatternDetector::for_graph(&sparse).detect(&sparse);
        let d = mapper.map(&dense, &dense_patterns, None);
        let s = mapper.map(&sparse, &sparse_patterns, None);
        assert_in_unit(&d);
        assert_in_unit(&s);
        assert!(d.deep_thinking_engagement > s.deep_thinking_engagement);
        assert_eq!(s.deep_thinking_engagement, 0.0);
    }

    #[test]
    fn test_offloading_formula() {
        // Unlinked moves: orphan 1, range 0, density 0 -> 1 - (0.4 - 0 - 0.3) = 0.9
        let g = graph(&[0, 1, 2], &[]);
        let m = CognitiveMapper::default().map(&g, &[], None);
        assert!((m.cognitive_offloading_prevention - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_metacognition_counts_reflection_and_corrections() {
        let texts = [
            "Looking back, I realize the entry was too narrow",
            "Actually, the stair should move north",
            "The site slopes to the south",
            "The roof collects rain",
        ];
        let g = graph(&[0, 1, 2, 3], &texts);
        let m = CognitiveMapper::default().map(&g, &[], None);
        // one reflective move of four, one correction at weight 0.1
        assert!((m.metacognitive_awareness - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_scaffolding_from_signals() {
        let signals = InteractionSignals {
            turns: vec![
                TurnSignal {
                    route_appropriate: true,
                    guidance_fit: 1.0,
                    understanding: 0.0,
                    tutor_question: false,
                },
                TurnSignal {
                    route_appropriate: true,
                    guidance_fit: 0.5,
                    understanding: 0.5,
                    tutor_question: true,
                },
            ],
        };
        let g = graph(&[0, 0], &[]);
        let m = CognitiveMapper::default().map(&g, &[], Some(&signals));
        let expected = 0.4 * 1.0 + 0.3 * 0.75 + 0.3 * 1.0;
        assert!((m.scaffolding_effectiveness - expected).abs() < 1e-12);
        assert_eq!(signals.question_turns(), 1);
        assert_eq!(signals.answer_turns(), 1);
    }

    #[test]
    fn test_mapper_is_deterministic() {
        let g = graph(&[0, 0, 1, 0, 2, 2, 0], &[]);
        let patterns = PatternDetector::for_graph(&g).detect(&g);
        let mapper = CognitiveMapper::default();
        let a = mapper.map(&g, &patterns, None);
        let b = mapper.map(&g, &patterns, None);
        assert_eq!(a, b);
        assert_eq!(a.overall.to_bits(), b.overall.to_bits());
    }

    #[test]
    fn test_slope() {
        assert_eq!(least_squares_slope(&[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(least_squares_slope(&[2.0, 2.0]), 0.0);
        assert_eq!(least_squares_slope(&[5.0]), 0.0);
    }
}
