use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::AppResult;
use crate::session::{Arm, Proficiency, SessionAnalyzer, SessionMetrics};
use crate::storage::Storage;

/// File name of the per-session table.
pub const SESSION_TABLE: &str = "master_session_metrics.csv";
/// File name of the per-metric aggregate table.
pub const AGGREGATE_TABLE: &str = "master_aggregate_metrics.csv";

type Extract = fn(&SessionMetrics) -> f64;

/// Numeric per-session columns in table order. Each one also becomes a row
/// of the aggregate table.
const NUMERIC_COLUMNS: &[(&str, Extract)] = &[
    ("total_interactions", |m| m.total_interactions as f64),
    ("move_count", |m| m.move_count as f64),
    ("duration_minutes", |m| m.duration_minutes),
    ("prevention_rate", |m| m.cognitive.cognitive_offloading_prevention),
    ("deep_thinking_rate", |m| m.cognitive.deep_thinking_engagement),
    ("scaffolding_effectiveness", |m| m.cognitive.scaffolding_effectiveness),
    ("concept_integration", |m| m.cognitive.knowledge_integration),
    ("engagement_rate", |m| m.engagement_rate),
    ("metacognitive_awareness", |m| m.cognitive.metacognitive_awareness),
    ("learning_progression", |m| m.cognitive.learning_progression),
    ("overall_cognitive_score", |m| m.cognitive.overall),
    ("improvement_score", |m| m.improvement_score),
    ("analysis_usage_rate", |m| m.agent_usage.analysis),
    ("context_usage_rate", |m| m.agent_usage.context),
    ("domain_expert_usage_rate", |m| m.agent_usage.domain_expert),
    ("socratic_usage_rate", |m| m.agent_usage.socratic),
    ("enhancement_usage_rate", |m| m.agent_usage.enhancement),
];

/// One row of the aggregate table. `None` marks a group without sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub metric_name: &'static str,
    pub overall: Option<f64>,
    /// In [`Arm::ALL`] order.
    pub by_arm: Vec<Option<f64>>,
    /// In [`Proficiency::ALL`] order.
    pub by_proficiency: Vec<Option<f64>>,
    pub sample_size: usize,
}

/// Paths of the tables written by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub sessions: PathBuf,
    pub aggregate: PathBuf,
}

fn mean<'a>(values: impl Iterator<Item = &'a SessionMetrics>, extract: Extract) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), m| (sum + extract(m), n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn csv_field(raw: &str) -> String {
    if raw.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn number(value: f64) -> String {
    format!("{:.6}", value)
}

fn optional_number(value: Option<f64>) -> String {
    value.map(number).unwrap_or_default()
}

/// Regenerates the master tables from stored sessions. The tables are a
/// cache; the session store stays the source of truth.
#[derive(Debug, Clone, Default)]
pub struct MetricAggregator {
    analyzer: SessionAnalyzer,
}

impl MetricAggregator {
    /// Create an aggregator that derives session metrics with `analyzer`
    pub fn new(analyzer: SessionAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Session metrics of every stored session, sorted by session id.
    pub async fn collect(&self, store: &dyn Storage) -> AppResult<Vec<SessionMetrics>> {
        let sessions = store.list_sessions().await?;
        let mut rows = Vec::with_capacity(sessions.len());
        for session in sessions {
            let (_, artifacts, _) = self.analyzer.load_or_derive(store, &session.id).await?;
            rows.push(artifacts.metrics);
        }
        rows.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(rows)
    }

    /// One aggregate row per numeric column.
    pub fn aggregate(sessions: &[SessionMetrics]) -> Vec<AggregateRow> {
        NUMERIC_COLUMNS
            .iter()
            .map(|(name, extract)| AggregateRow {
                metric_name: *name,
                overall: mean(sessions.iter(), *extract),
                by_arm: Arm::ALL
                    .iter()
                    .map(|arm| mean(sessions.iter().filter(|m| m.arm == *arm), *extract))
                    .collect(),
                by_proficiency: Proficiency::ALL
                    .iter()
                    .map(|p| mean(sessions.iter().filter(|m| m.proficiency == *p), *extract))
                    .collect(),
                sample_size: sessions.len(),
            })
            .collect()
    }

    /// The per-session table as CSV text.
    pub fn session_table(sessions: &[SessionMetrics]) -> String {
        let mut out = String::from("session_id,arm,proficiency_level");
        for (name, _) in NUMERIC_COLUMNS {
            out.push(',');
            out.push_str(name);
        }
        out.push('\n');

        for m in sessions {
            let _ = write!(
                out,
                "{},{},{}",
                csv_field(&m.session_id),
                m.arm.as_str(),
                m.proficiency.as_str()
            );
            for (name, extract) in NUMERIC_COLUMNS {
                out.push(',');
                match *name {
                    "total_interactions" => out.push_str(&m.total_interactions.to_string()),
                    "move_count" => out.push_str(&m.move_count.to_string()),
                    _ => out.push_str(&number(extract(m))),
                }
            }
            out.push('\n');
        }
        out
    }

    /// The aggregate table as CSV text.
    pub fn aggregate_table(rows: &[AggregateRow]) -> String {
        let mut out = String::from("metric_name,overall_avg");
        for arm in Arm::ALL {
            let _ = write!(out, ",{}_avg", arm.as_str());
        }
        for p in Proficiency::ALL {
            let _ = write!(out, ",{}_avg", p.as_str());
        }
        out.push_str(",sample_size\n");

        for row in rows {
            out.push_str(row.metric_name);
            out.push(',');
            out.push_str(&optional_number(row.overall));
            for value in row.by_arm.iter().chain(row.by_proficiency.iter()) {
                out.push(',');
                out.push_str(&optional_number(*value));
            }
            let _ = writeln!(out, ",{}", row.sample_size);
        }
        out
    }

    /// Write both tables into `dir`, creating it if needed.
    pub fn write_tables(dir: &Path, sessions: &[SessionMetrics]) -> AppResult<TablePaths> {
        std::fs::create_dir_all(dir)?;
        let paths = TablePaths {
            sessions: dir.join(SESSION_TABLE),
            aggregate: dir.join(AGGREGATE_TABLE),
        };
        std::fs::write(&paths.sessions, Self::session_table(sessions))?;
        std::fs::write(
            &paths.aggregate,
            Self::aggregate_table(&Self::aggregate(sessions)),
        )?;
        Ok(paths)
    }

    /// Collect every session and write the master tables.
    pub async fn run(&self, store: &dyn Storage, dir: &Path) -> AppResult<TablePaths> {
        let sessions = self.collect(store).await?;
        if sessions.is_empty() {
            warn!("No sessions stored; writing header-only tables");
        }
        let paths = Self::write_tables(dir, &sessions)?;
        info!(
            sessions = sessions.len(),
            dir = %dir.display(),
            "Master metric tables written"
        );
        Ok(paths)
    }
}
