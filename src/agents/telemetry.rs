use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::types::AgentKind;
use crate::llm::Usage;

/// What a telemetry event measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    /// One call through the agent kernel.
    LlmCall,
    /// One workflow node, end to end.
    Node,
}

/// A single timed operation within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub agent: AgentKind,
    pub kind: TelemetryKind,
    pub latency_ms: u64,
    #[serde(default)]
    pub usage: Usage,
    pub success: bool,
    /// The node fell back to a degraded path.
    #[serde(default)]
    pub degraded: bool,
    /// The node hit its soft deadline.
    #[serde(default)]
    pub cancelled: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// A successful LLM call
    pub fn llm_ok(agent: AgentKind, latency_ms: u64, usage: Usage) -> Self {
        Self {
            agent,
            kind: TelemetryKind::LlmCall,
            latency_ms,
            usage,
            success: true,
            degraded: false,
            cancelled: false,
            error: None,
            at: Utc::now(),
        }
    }

    /// A failed LLM call
    pub fn llm_failed(agent: AgentKind, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::llm_ok(agent, latency_ms, Usage::default())
        }
    }

    /// A finished workflow node
    pub fn node(agent: AgentKind, latency_ms: u64, outcome: &str) -> Self {
        Self {
            agent,
            kind: TelemetryKind::Node,
            latency_ms,
            usage: Usage::default(),
            success: outcome == "ok",
            degraded: outcome == "degraded",
            cancelled: outcome == "cancelled",
            error: (outcome != "ok").then(|| outcome.to_string()),
            at: Utc::now(),
        }
    }
}

/// Per-turn telemetry recorder, cheap to clone and shared by the kernel and
/// the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl TelemetrySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }

    /// Copy of the events recorded so far.
    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Token usage summed over all LLM calls.
    pub fn total_usage(&self) -> Usage {
        self.events
            .lock()
            .iter()
            .fold(Usage::default(), |acc, e| acc.add(&e.usage))
    }

    /// Whether any node degraded or was cancelled.
    pub fn any_degraded(&self) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.degraded || e.cancelled)
    }
}
