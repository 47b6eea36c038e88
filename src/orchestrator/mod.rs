//! Session orchestration.
//!
//! This module provides:
//! - Shared core services (LLM kernel, embeddings, store)
//! - The per-turn mentor workflow DAG
//! - Live tutoring sessions and their final reports
//!
//! Every turn of a session runs the arm's reply path, appends the student
//! and tutor moves, updates the session linkograph incrementally and stores
//! the interaction record.

mod session;
mod workflow;

pub use session::{TurnReply, TutorSession, CONTROL_REPLY, REJECTION_REPLY};
pub use workflow::{MentorWorkflow, WorkflowOutcome};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::agents::{AgentKernel, VisualAnalyzer};
use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{AppResult, StorageError};
use crate::llm::{ChatClient, LlmBackend};
use crate::session::{Arm, Proficiency, SessionAnalyzer, SessionRecord, SessionReport};
use crate::storage::{SqliteStorage, Storage};

/// Services shared by every session.
#[derive(Clone)]
pub struct CoreContext {
    /// Application configuration.
    pub config: Config,
    /// Embedding front-end with its cache.
    pub embeddings: EmbeddingService,
    /// The only path to the LLM.
    pub kernel: AgentKernel,
    /// Session store.
    pub store: Arc<dyn Storage>,
    /// Optional drawing analyser for image turns.
    pub visual: Option<Arc<dyn VisualAnalyzer>>,
}

impl CoreContext {
    /// Assemble a context from ready-made services
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmBackend>,
        embeddings: EmbeddingService,
        store: Arc<dyn Storage>,
    ) -> Self {
        let kernel = AgentKernel::new(llm, config.llm.clone());
        Self {
            config,
            embeddings,
            kernel,
            store,
            visual: None,
        }
    }

    /// Attach a visual analyser
    pub fn with_visual_analyzer(mut self, analyzer: Arc<dyn VisualAnalyzer>) -> Self {
        self.visual = Some(analyzer);
        self
    }

    /// Build the production services from configuration.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let llm = ChatClient::new(&config.llm, config.request.clone())?;
        let embeddings = EmbeddingService::from_config(&config.embedding, config.request.clone())?;
        let storage = SqliteStorage::new(&config.database).await?;

        info!(
            model = %config.llm.model_id,
            embedding_model = %embeddings.model_id(),
            database = %config.database.path.display(),
            "Core services ready"
        );

        Ok(Self::new(config, Arc::new(llm), embeddings, Arc::new(storage)))
    }
}

/// Entry point for starting, resuming and reporting on sessions.
pub struct Orchestrator {
    core: Arc<CoreContext>,
    workflow: Arc<MentorWorkflow>,
    analyzer: SessionAnalyzer,
}

impl Orchestrator {
    /// Create an orchestrator over shared services
    pub fn new(core: CoreContext) -> Self {
        let deadline = Duration::from_millis(core.config.orchestrator.node_deadline_ms);
        let workflow = MentorWorkflow::new(core.kernel.clone(), core.visual.clone(), deadline);
        let analyzer = SessionAnalyzer::from_config(&core.config);
        Self {
            core: Arc::new(core),
            workflow: Arc::new(workflow),
            analyzer,
        }
    }

    /// Shared services.
    pub fn core(&self) -> &CoreContext {
        &self.core
    }

    /// Session analyser configured like the live sessions.
    pub fn analyzer(&self) -> &SessionAnalyzer {
        &self.analyzer
    }

    /// Create and store a new session.
    pub async fn start_session(
        &self,
        arm: Arm,
        proficiency: Proficiency,
        project_context: impl Into<String>,
    ) -> AppResult<TutorSession> {
        let record = SessionRecord::new(arm, proficiency, project_context);
        self.core.store.create_session(&record).await?;
        info!(
            session_id = %record.id,
            arm = %arm,
            proficiency = %proficiency,
            "Session started"
        );
        Ok(self.restore(record, Vec::new(), &[]))
    }

    /// Rebuild a live session from what the store holds.
    pub async fn resume_session(&self, session_id: &str) -> AppResult<TutorSession> {
        let record = self.core.store.get_session(session_id).await?.ok_or_else(|| {
            StorageError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;
        let moves = self.core.store.get_moves(session_id).await?;
        let interactions = self.core.store.get_interactions(session_id).await?;
        info!(
            session_id = %record.id,
            moves = moves.len(),
            turns = interactions.len(),
            "Session resumed"
        );
        Ok(self.restore(record, moves, &interactions))
    }

    fn restore(
        &self,
        record: SessionRecord,
        moves: Vec<crate::linkography::Move>,
        interactions: &[crate::session::Interaction],
    ) -> TutorSession {
        TutorSession::restore(
            Arc::clone(&self.core),
            Arc::clone(&self.workflow),
            self.analyzer.clone(),
            record,
            moves,
            interactions,
        )
    }

    /// Report for a stored session, derived or served from the cache.
    pub async fn report(&self, session_id: &str) -> AppResult<SessionReport> {
        let (record, artifacts, transcript) = self
            .analyzer
            .load_or_derive(self.core.store.as_ref(), session_id)
            .await?;
        Ok(SessionReport::new(
            record,
            artifacts,
            transcript,
            self.analyzer.baselines(),
        ))
    }
}
