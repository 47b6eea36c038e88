use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::safety::{SafetyValidator, SafetyVerdict};
use super::telemetry::{TelemetryEvent, TelemetrySink};
use super::types::AgentKind;
use crate::config::LlmConfig;
use crate::error::LlmResult;
use crate::llm::{ChatRequest, Completion, LlmBackend, Message};

/// Shared services injected into every agent: the only path to the LLM,
/// with token capping, output redaction and telemetry.
#[derive(Clone)]
pub struct AgentKernel {
    llm: Arc<dyn LlmBackend>,
    config: LlmConfig,
    safety: SafetyValidator,
}

impl AgentKernel {
    /// Create a kernel over an LLM backend
    pub fn new(llm: Arc<dyn LlmBackend>, config: LlmConfig) -> Self {
        Self {
            llm,
            config,
            safety: SafetyValidator::new(),
        }
    }

    /// The safety validator.
    pub fn safety(&self) -> &SafetyValidator {
        &self.safety
    }

    /// Check a learner message before any agent sees it.
    pub fn check_input(&self, text: &str) -> SafetyVerdict {
        self.safety.check_input(text)
    }

    /// Configured model id.
    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    /// Run one completion on behalf of `agent`.
    ///
    /// `max_tokens` is capped at the configured maximum; `temperature`
    /// defaults to the configured value. The reply is redacted and every
    /// call, successful or not, is recorded in `telemetry`.
    pub async fn generate(
        &self,
        telemetry: &TelemetrySink,
        agent: AgentKind,
        messages: Vec<Message>,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> LlmResult<Completion> {
        let max_tokens = max_tokens
            .unwrap_or(self.config.max_tokens)
            .min(self.config.max_tokens);
        let request = ChatRequest::new(&self.config.model_id, messages)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature.unwrap_or(self.config.temperature));

        let start = Instant::now();
        let result = self.llm.generate(&request).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(completion) => {
                debug!(
                    agent = %agent,
                    latency_ms,
                    total_tokens = completion.usage.total_tokens,
                    "LLM call completed"
                );
                telemetry.record(TelemetryEvent::llm_ok(agent, latency_ms, completion.usage));
                let content = self.safety.redact(completion.content.trim());
                Ok(Completion::new(content, completion.usage))
            }
            Err(e) => {
                warn!(agent = %agent, latency_ms, error = %e, "LLM call failed");
                telemetry.record(TelemetryEvent::llm_failed(agent, latency_ms, e.to_string()));
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for AgentKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKernel")
            .field("model_id", &self.config.model_id)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}
