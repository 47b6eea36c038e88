//! Cognitive metrics: the mapper from linkographic structure to the six
//! pedagogical scores, the fixed tutoring baselines, and the cross-session
//! aggregator that writes the master tables.

mod aggregate;
mod baselines;
mod cognitive;

pub use aggregate::{AggregateRow, MetricAggregator, TablePaths, AGGREGATE_TABLE, SESSION_TABLE};
pub use baselines::{relative_improvement, BaselineComparison, MetricImprovement, ScientificBaselines};
pub use cognitive::{
    CognitiveMapper, CognitiveMetric, CognitiveMetrics, InteractionSignals, TurnSignal,
};
