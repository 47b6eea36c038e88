use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::workflow::MentorWorkflow;
use super::CoreContext;
use crate::agents::{
    AgentContext, AgentKind, AgentResponse, CognitiveFlag, ContextAgent, ResponseType,
    SafetyVerdict, SessionView, TelemetrySink,
};
use crate::error::AppResult;
use crate::linkography::{Author, LinkographBuilder, Linkograph, Move, PatternDetector};
use crate::llm::Message;
use crate::metrics::{CognitiveMapper, CognitiveMetric, CognitiveMetrics, InteractionSignals, TurnSignal};
use crate::phase::{LearningStep, PhaseAssessment, PhaseTracker};
use crate::prompts::GENERIC_ASSISTANT_PROMPT;
use crate::routing::{Classification, Route};
use crate::session::{guidance_fit, Arm, Interaction, SessionAnalyzer, SessionRecord, SessionReport};
use crate::text::{question_count, word_count};

/// Reply of the control arm.
pub const CONTROL_REPLY: &str = "Noted. Please continue with your design work.";

/// Reply to input the safety validator rejected.
pub const REJECTION_REPLY: &str =
    "I can't help with that. Let's return to your project and the next decision you need to make.";

/// What the learner gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub interaction_id: String,
    pub turn: usize,
    /// Never empty.
    pub text: String,
    pub response_type: ResponseType,
    /// Route of the mentor workflow; `None` on the other arms.
    pub route: Option<Route>,
    pub cognitive_flags: Vec<CognitiveFlag>,
    pub phase: PhaseAssessment,
    /// Session metrics after this turn.
    pub metrics: CognitiveMetrics,
    pub degraded: bool,
}

/// Reply plus bookkeeping, independent of the arm.
struct ArmReply {
    classification: Classification,
    route: Option<Route>,
    response: AgentResponse,
    agents_invoked: Vec<AgentKind>,
    degraded: bool,
}

/// Step the previous tutor reply was driving. Answering it covers the step.
fn step_driven_by(route: Route) -> Option<LearningStep> {
    match route {
        Route::KnowledgeOnly => Some(LearningStep::KnowledgeSynthesisTrigger),
        Route::SocraticExploration | Route::CognitiveChallenge => {
            Some(LearningStep::SocraticQuestioning)
        }
        Route::SupportiveScaffolding | Route::BalancedGuidance => None,
    }
}

/// One live tutoring session.
///
/// Turns are processed strictly in order through `&mut self`. The session
/// linkograph and metrics are updated incrementally, so a snapshot taken
/// after turn N reflects turns up to N and nothing later.
pub struct TutorSession {
    core: Arc<CoreContext>,
    workflow: Arc<MentorWorkflow>,
    analyzer: SessionAnalyzer,
    record: SessionRecord,
    builder: LinkographBuilder,
    mapper: CognitiveMapper,
    graph: Linkograph,
    tracker: PhaseTracker,
    signals: InteractionSignals,
    metrics: CognitiveMetrics,
    history: Vec<Message>,
    next_move_index: usize,
    turn: usize,
    last_route: Option<Route>,
    include_tutor_moves: bool,
}

impl TutorSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        core: Arc<CoreContext>,
        workflow: Arc<MentorWorkflow>,
        analyzer: SessionAnalyzer,
        record: SessionRecord,
        moves: Vec<Move>,
        interactions: &[Interaction],
    ) -> Self {
        let config = &core.config;
        let builder = LinkographBuilder::new((&config.linkography).into());
        let mapper = CognitiveMapper::new(config.metrics.clone());

        let graph_moves = analyzer.linkograph_moves(&moves);
        let embeddings: Vec<Option<Vec<f32>>> =
            graph_moves.iter().map(|m| m.embedding.clone()).collect();
        let slices: Vec<Option<&[f32]>> = embeddings.iter().map(|e| e.as_deref()).collect();
        let graph = builder.build_with_embeddings(graph_moves, &slices);

        let student_moves = moves.iter().filter(|m| m.author == Author::Student).count();
        let tracker = match interactions.last() {
            Some(last) => PhaseTracker::resume(
                crate::phase::DEFAULT_MIN_STEP_WORDS,
                last.phase,
                last.step,
                student_moves,
            ),
            None => PhaseTracker::default(),
        };

        let signals = crate::session::interaction_signals(interactions);
        let patterns = PatternDetector::for_graph(&graph).detect(&graph);
        let metrics = mapper.map(&graph, &patterns, Some(&signals));

        let mut history = Vec::with_capacity(interactions.len() * 2);
        for interaction in interactions {
            history.push(Message::user(interaction.input_text.clone()));
            history.push(Message::assistant(interaction.response_text.clone()));
        }

        Self {
            include_tutor_moves: config.linkography.include_tutor_moves,
            next_move_index: moves.len(),
            turn: interactions.len(),
            last_route: interactions
                .last()
                .and_then(|i| i.route.or(i.classification.as_ref().map(|c| c.routing_path))),
            core,
            workflow,
            analyzer,
            record,
            builder,
            mapper,
            graph,
            tracker,
            signals,
            metrics,
            history,
        }
    }

    /// The stored session record.
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Number of completed turns.
    pub fn turns(&self) -> usize {
        self.turn
    }

    /// Current session linkograph.
    pub fn linkograph(&self) -> &Linkograph {
        &self.graph
    }

    /// Session metrics after the last completed turn.
    pub fn metrics(&self) -> &CognitiveMetrics {
        &self.metrics
    }

    /// Current phase and step.
    pub fn phase(&self) -> PhaseAssessment {
        self.tracker.assessment()
    }

    fn view(&self, assessment: &PhaseAssessment) -> SessionView {
        SessionView {
            session_id: self.record.id.clone(),
            arm: self.record.arm,
            proficiency: self.record.proficiency,
            project_context: self.record.project_context.clone(),
            turn: self.turn,
            student_moves: self.tracker.student_moves(),
            linkograph: self.graph.metrics.clone(),
            phase_linkograph: self.graph.phase_subgraph(assessment.phase).metrics,
        }
    }

    fn recent_messages(&self) -> Vec<Message> {
        let keep = self.core.config.orchestrator.recent_messages;
        let start = self.history.len().saturating_sub(keep);
        self.history[start..].to_vec()
    }

    /// Process one learner message. Never fails: storage and agent errors
    /// are logged and the learner still gets a well-formed reply.
    pub async fn process_turn(&mut self, input: &str) -> TurnReply {
        self.process(input, None).await
    }

    /// Process a learner message that comes with a drawing or photo.
    pub async fn process_turn_with_image(&mut self, input: &str, image: Vec<u8>) -> TurnReply {
        self.process(input, Some(Arc::new(image))).await
    }

    async fn process(&mut self, input: &str, image: Option<Arc<Vec<u8>>>) -> TurnReply {
        let start = Instant::now();
        let telemetry = TelemetrySink::new();
        // Contact details never reach storage, embeddings or the LLM.
        let safety = self.core.kernel.safety();
        let redacted = safety.redact(input);
        if redacted != input {
            debug!(session_id = %self.record.id, turn = self.turn, "Personal details redacted from input");
        }
        let input = redacted.as_str();
        let mut interaction = Interaction::new(&self.record.id, self.turn, input);

        if let SafetyVerdict::Rejected { reason } = self.core.kernel.check_input(input) {
            warn!(session_id = %self.record.id, turn = self.turn, reason = %reason, "Input rejected");
            interaction.response_text = REJECTION_REPLY.to_string();
            let assessment = self.tracker.assessment();
            interaction.phase = assessment.phase;
            interaction.step = assessment.step;
            self.persist_interaction(&interaction).await;
            return self.finish_turn(interaction, None, assessment);
        }

        let phase_before = self.tracker.phase();
        let flagged = self.last_route.and_then(step_driven_by);
        let assessment = self.tracker.observe(input, flagged);

        let mut ctx = AgentContext::new(self.view(&assessment), input)
            .with_recent_messages(self.recent_messages())
            .with_phase(assessment);
        if let Some(image) = image {
            ctx = ctx.with_image(image);
        }

        // The student move's embedding overlaps with the agent calls.
        let (student_embedding, reply) = tokio::join!(
            self.core.embeddings.embed(input),
            self.reply_for_arm(ctx, &telemetry)
        );

        let student_embedding = match student_embedding {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Student move embedding failed; move stays unlinked");
                None
            }
        };
        let student_move = Move::new(self.next_move_index, Author::Student, input, phase_before);
        self.record_move(student_move, student_embedding.as_deref().map(Vec::as_slice))
            .await;

        let tutor_embedding = match self.core.embeddings.embed(&reply.response.response_text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Tutor move embedding failed; move stays unlinked");
                None
            }
        };
        let tutor_move = Move::new(
            self.next_move_index,
            Author::Tutor,
            reply.response.response_text.clone(),
            assessment.phase,
        );
        self.record_move(tutor_move, tutor_embedding.as_deref().map(Vec::as_slice))
            .await;

        let text = &reply.response.response_text;
        let expected = reply.classification.routing_path;
        let signal = TurnSignal {
            route_appropriate: expected.question_policy().complies(text),
            guidance_fit: guidance_fit(self.record.proficiency, word_count(text)),
            understanding: reply.classification.understanding_level.score(),
            tutor_question: question_count(text) > 0,
        };
        let deltas = self.update_metrics(signal.clone());

        interaction.classification = Some(reply.classification);
        interaction.route = reply.route;
        interaction.agents_invoked = reply.agents_invoked;
        interaction.response_text = reply.response.response_text;
        interaction.response_type = reply.response.response_type;
        interaction.cognitive_flags = reply.response.cognitive_flags;
        interaction.enhancement_metrics = reply.response.enhancement_metrics;
        interaction.metric_deltas = deltas;
        interaction.phase = assessment.phase;
        interaction.step = assessment.step;
        interaction.signal = signal;
        interaction.degraded = reply.degraded || telemetry.any_degraded();
        interaction.telemetry = telemetry.take();

        self.persist_interaction(&interaction).await;
        self.last_route = reply.route.or(Some(expected));

        info!(
            session_id = %self.record.id,
            turn = interaction.turn,
            arm = %self.record.arm,
            route = ?interaction.route,
            degraded = interaction.degraded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Turn processed"
        );
        self.finish_turn(interaction, reply.route, assessment)
    }

    async fn reply_for_arm(&self, ctx: AgentContext, telemetry: &TelemetrySink) -> ArmReply {
        match self.record.arm {
            Arm::Mentor => {
                let outcome = self.workflow.run(ctx, telemetry).await;
                ArmReply {
                    classification: outcome.classification,
                    route: Some(outcome.route),
                    response: outcome.response,
                    agents_invoked: outcome.agents_invoked,
                    degraded: outcome.degraded,
                }
            }
            Arm::GenericAi => {
                let (classification, _) = ContextAgent::new().classify(&ctx.input);
                let (response, degraded) = self.generic_reply(&ctx, telemetry).await;
                ArmReply {
                    classification,
                    route: None,
                    response,
                    agents_invoked: vec![AgentKind::Assistant],
                    degraded,
                }
            }
            Arm::Control => {
                let (classification, _) = ContextAgent::new().classify(&ctx.input);
                ArmReply {
                    classification,
                    route: None,
                    response: AgentResponse::new(
                        AgentKind::Assistant,
                        ResponseType::Acknowledgement,
                        CONTROL_REPLY,
                    ),
                    agents_invoked: Vec::new(),
                    degraded: false,
                }
            }
        }
    }

    async fn generic_reply(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> (AgentResponse, bool) {
        let mut messages = vec![Message::system(GENERIC_ASSISTANT_PROMPT)];
        if !ctx.session.project_context.is_empty() {
            messages.push(Message::system(format!(
                "Project: {}",
                ctx.session.project_context
            )));
        }
        messages.extend(ctx.recent_messages.iter().cloned());
        messages.push(Message::user(ctx.input.clone()));

        let deadline = self.workflow.deadline();
        let generated = timeout(
            deadline,
            self.core
                .kernel
                .generate(telemetry, AgentKind::Assistant, messages, None, None),
        )
        .await;

        match generated {
            Ok(Ok(completion)) if !completion.content.trim().is_empty() => (
                AgentResponse::new(AgentKind::Assistant, ResponseType::Generic, completion.content),
                false,
            ),
            other => {
                match other {
                    Ok(Err(e)) => warn!(error = %e, "Generic assistant call failed"),
                    Err(_) => warn!("Generic assistant call timed out"),
                    Ok(Ok(_)) => warn!("Generic assistant returned an empty reply"),
                }
                let text = format!(
                    "Thanks for sharing. Tell me a little more about what you want {} to achieve.",
                    ctx.session.project_anchor()
                );
                (
                    AgentResponse::new(AgentKind::Assistant, ResponseType::Fallback, text),
                    true,
                )
            }
        }
    }

    /// Store a move and add it to the session linkograph.
    async fn record_move(&mut self, mut design_move: Move, embedding: Option<&[f32]>) {
        design_move.embedding = embedding.map(<[f32]>::to_vec);
        self.next_move_index += 1;

        if let Err(e) = self.core.store.append_move(&self.record.id, &design_move).await {
            error!(
                session_id = %self.record.id,
                index = design_move.index,
                error = %e,
                "Failed to store move"
            );
        }

        if self.include_tutor_moves || design_move.author == Author::Student {
            self.builder.append(&mut self.graph, design_move, embedding);
        }
    }

    /// Recompute the session metrics and return the per-metric change.
    fn update_metrics(&mut self, signal: TurnSignal) -> BTreeMap<CognitiveMetric, f64> {
        self.signals.turns.push(signal);
        let patterns = PatternDetector::for_graph(&self.graph).detect(&self.graph);
        let updated = self.mapper.map(&self.graph, &patterns, Some(&self.signals));

        let deltas = CognitiveMetric::ALL
            .iter()
            .map(|m| (*m, updated.get(*m) - self.metrics.get(*m)))
            .collect();
        debug!(
            overall = updated.overall,
            patterns = patterns.len(),
            links = self.graph.links.len(),
            "Session metrics updated"
        );
        self.metrics = updated;
        deltas
    }

    async fn persist_interaction(&self, interaction: &Interaction) {
        if let Err(e) = self.core.store.append_interaction(interaction).await {
            error!(
                session_id = %self.record.id,
                turn = interaction.turn,
                error = %e,
                "Failed to store interaction"
            );
        }
        if let Err(e) = self.core.store.touch_session(&self.record.id, Utc::now()).await {
            warn!(session_id = %self.record.id, error = %e, "Failed to touch session");
        }
    }

    fn finish_turn(
        &mut self,
        interaction: Interaction,
        route: Option<Route>,
        phase: PhaseAssessment,
    ) -> TurnReply {
        self.history.push(Message::user(interaction.input_text.clone()));
        self.history
            .push(Message::assistant(interaction.response_text.clone()));
        self.turn += 1;

        TurnReply {
            interaction_id: interaction.id,
            turn: interaction.turn,
            text: interaction.response_text,
            response_type: interaction.response_type,
            route,
            cognitive_flags: interaction.cognitive_flags,
            phase,
            metrics: self.metrics,
            degraded: interaction.degraded,
        }
    }

    /// Derive the full session report from what was stored.
    pub async fn finalize(self) -> AppResult<SessionReport> {
        let (record, artifacts, transcript) = self
            .analyzer
            .load_or_derive(self.core.store.as_ref(), &self.record.id)
            .await?;
        info!(
            session_id = %record.id,
            turns = transcript.len(),
            overall = artifacts.cognitive.overall,
            "Session finalised"
        );
        Ok(SessionReport::new(
            record,
            artifacts,
            transcript,
            self.analyzer.baselines(),
        ))
    }
}
