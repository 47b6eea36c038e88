use serde::{Deserialize, Serialize};

use super::cognitive::{CognitiveMetric, CognitiveMetrics};

/// Reference scores of traditional one-to-one design tutoring, fixed
/// constants taken from published tutoring studies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScientificBaselines {
    pub cognitive_offloading_prevention: f64,
    pub deep_thinking_engagement: f64,
    pub scaffolding_effectiveness: f64,
    pub knowledge_integration: f64,
    pub learning_progression: f64,
    pub metacognitive_awareness: f64,
}

impl Default for ScientificBaselines {
    fn default() -> Self {
        Self {
            cognitive_offloading_prevention: 0.48,
            deep_thinking_engagement: 0.42,
            scaffolding_effectiveness: 0.61,
            knowledge_integration: 0.29,
            learning_progression: 0.35,
            metacognitive_awareness: 0.31,
        }
    }
}

impl ScientificBaselines {
    /// Baseline value of one metric.
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

    /// Relative improvement of measured scores over the baselines.
    pub fn compare(&self, measured: &CognitiveMetrics) -> BaselineComparison {
        let improvements: Vec<MetricImprovement> = CognitiveMetric::ALL
            .iter()
            .map(|&metric| {
                let baseline = self.get(metric);
                let value = measured.get(metric);
                MetricImprovement {
                    metric,
                    measured: value,
                    baseline,
                    improvement: relative_improvement(value, baseline),
                }
            })
            .collect();
        let overall = improvements.iter().map(|i| i.improvement).sum::<f64>()
            / improvements.len() as f64;
        BaselineComparison {
            improvements,
            overall_improvement: overall,
        }
    }
}

/// (measured - baseline) / baseline; 0 for a non-positive baseline.
pub fn relative_improvement(measured: f64, baseline: f64) -> f64 {
    if baseline <= 0.0 {
        0.0
    } else {
        (measured - baseline) / baseline
    }
}

/// One metric against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricImprovement {
    pub metric: CognitiveMetric,
    pub measured: f64,
    pub baseline: f64,
    pub improvement: f64,
}

/// All six metrics against their baselines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub improvements: Vec<MetricImprovement>,
    /// Mean of the per-metric improvements.
    pub overall_improvement: f64,
}
