use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::agents::{
    template_question, validate_question, Agent, AgentContext, AgentKernel, AgentKind,
    AgentMetadata, AgentOutcome, AgentResponse, AnalysisAgent, CognitiveEnhancementAgent,
    ContextAgent, DomainExpert, ResponseType, SocraticTutor, TelemetryEvent, TelemetrySink,
    VisualAnalyzer,
};
use crate::llm::Message;
use crate::prompts::{render, FALLBACK_QUESTION_PROMPT};
use crate::routing::{Classification, Route};
use crate::text::content_words;

const FALLBACK_MAX_TOKENS: u32 = 80;

/// What one mentor turn produced.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub classification: Classification,
    pub route: Route,
    /// Final, policy-checked reply.
    pub response: AgentResponse,
    /// Nodes that ran, in order.
    pub agents_invoked: Vec<AgentKind>,
    /// Some node failed or timed out and a fallback was used.
    pub degraded: bool,
}

/// The fixed per-turn DAG:
/// context -> analysis -> route -> [domain_expert] -> [socratic_tutor] ->
/// compose -> post_check.
///
/// Nodes run one after another; each has a soft deadline. A node that fails
/// or overruns is recorded and the turn continues with what is available.
pub struct MentorWorkflow {
    context: ContextAgent,
    analysis: AnalysisAgent,
    expert: DomainExpert,
    tutor: SocraticTutor,
    enhancement: CognitiveEnhancementAgent,
    kernel: AgentKernel,
    deadline: Duration,
}

impl MentorWorkflow {
    /// Wire up the five agents around one kernel
    pub fn new(
        kernel: AgentKernel,
        visual: Option<Arc<dyn VisualAnalyzer>>,
        deadline: Duration,
    ) -> Self {
        let analysis = match visual {
            Some(analyzer) => AnalysisAgent::new().with_visual_analyzer(analyzer),
            None => AnalysisAgent::new(),
        };
        Self {
            context: ContextAgent::new(),
            analysis,
            expert: DomainExpert::new(kernel.clone()),
            tutor: SocraticTutor::new(kernel.clone()),
            enhancement: CognitiveEnhancementAgent::new(),
            kernel,
            deadline,
        }
    }

    /// Soft per-node deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn run_node(
        &self,
        agent: &dyn Agent,
        ctx: &AgentContext,
        telemetry: &TelemetrySink,
        invoked: &mut Vec<AgentKind>,
    ) -> AgentOutcome {
        let kind = agent.kind();
        invoked.push(kind);
        let start = Instant::now();

        let outcome = match timeout(self.deadline, agent.respond(ctx, telemetry)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    agent = %kind,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Node exceeded its deadline"
                );
                AgentOutcome::Cancelled
            }
        };
        if let AgentOutcome::Degraded { reason } = &outcome {
            warn!(agent = %kind, reason = %reason, "Node degraded");
        }

        telemetry.record(TelemetryEvent::node(
            kind,
            start.elapsed().as_millis() as u64,
            outcome.label(),
        ));
        outcome
    }

    /// Run one turn. Never fails; the reply is never empty.
    pub async fn run(&self, mut ctx: AgentContext, telemetry: &TelemetrySink) -> WorkflowOutcome {
        let mut invoked = Vec::new();
        let mut degraded = false;

        let classification = match self.run_node(&self.context, &ctx, telemetry, &mut invoked).await
        {
            AgentOutcome::Ok(AgentResponse {
                metadata: AgentMetadata::Classification(c),
                ..
            }) => c,
            _ => {
                degraded = true;
                self.context.classify(&ctx.input).0
            }
        };
        let route = classification.routing_path;
        ctx.classification = Some(classification.clone());
        ctx.route = Some(route);

        match self.run_node(&self.analysis, &ctx, telemetry, &mut invoked).await {
            AgentOutcome::Ok(AgentResponse {
                metadata: AgentMetadata::Analysis(summary),
                ..
            }) => ctx.analysis = Some(summary),
            _ => degraded = true,
        }

        debug!(route = %route, ambiguous = classification.ambiguous, "Route selected");

        if route.needs_domain_expert() {
            match self.run_node(&self.expert, &ctx, telemetry, &mut invoked).await {
                AgentOutcome::Ok(response) => ctx.expert = Some(response),
                _ => degraded = true,
            }
        }

        // compose
        let draft = if route.needs_socratic_tutor() {
            match self.run_node(&self.tutor, &ctx, telemetry, &mut invoked).await {
                AgentOutcome::Ok(response) => Some(response),
                _ => None,
            }
        } else {
            ctx.expert.clone()
        };
        let draft = match draft {
            Some(draft) => draft,
            None => {
                degraded = true;
                self.fallback(&ctx, route, telemetry).await
            }
        };

        // post_check
        ctx.draft = Some(draft.clone());
        let response = match self
            .run_node(&self.enhancement, &ctx, telemetry, &mut invoked)
            .await
        {
            AgentOutcome::Ok(response) => response,
            _ => {
                degraded = true;
                let anchor = ctx.session.project_anchor();
                let (text, flags, _) = self.enhancement.enforce(route, &draft.response_text, &anchor);
                let mut response = AgentResponse::new(AgentKind::Enhancement, draft.response_type, text)
                    .with_key_points(draft.key_points.clone());
                for flag in draft.cognitive_flags.iter().chain(flags.iter()) {
                    response.add_flag(*flag);
                }
                response
            }
        };

        info!(
            route = %route,
            agents = invoked.len(),
            degraded,
            "Mentor turn composed"
        );

        WorkflowOutcome {
            classification,
            route,
            response,
            agents_invoked: invoked,
            degraded,
        }
    }

    /// Acknowledgement plus one open question, generated if possible.
    async fn fallback(
        &self,
        ctx: &AgentContext,
        route: Route,
        telemetry: &TelemetrySink,
    ) -> AgentResponse {
        let anchor = ctx.session.project_anchor();
        let confidence = ctx
            .classification
            .as_ref()
            .map(|c| c.confidence_level)
            .unwrap_or_default();

        let system = render(
            FALLBACK_QUESTION_PROMPT,
            &[("project", ctx.session.project_context.as_str())],
        );
        let messages = vec![Message::system(system), Message::user(ctx.input.clone())];
        let generated = timeout(
            self.deadline,
            self.kernel.generate(
                telemetry,
                AgentKind::Socratic,
                messages,
                Some(FALLBACK_MAX_TOKENS),
                None,
            ),
        )
        .await;

        let mut anchors = content_words(&ctx.session.project_context);
        anchors.extend(content_words(&ctx.input));
        let question = match generated {
            Ok(Ok(completion)) => validate_question(&completion.content, &anchors),
            Ok(Err(e)) => {
                warn!(error = %e, "Fallback question generation failed");
                None
            }
            Err(_) => {
                warn!("Fallback question generation timed out");
                None
            }
        }
        .unwrap_or_else(|| template_question(route, confidence, &anchor));

        AgentResponse::new(
            AgentKind::Socratic,
            ResponseType::Fallback,
            format!(
                "Thanks, I can see you are working through {}.\n\n{}",
                anchor, question
            ),
        )
    }
}
