//! Storage layer for tutoring session persistence.
//!
//! Sessions, moves and interactions are append-only: there is no update or
//! delete path for them. Derived artefacts are cached separately, keyed by
//! the content hash of the data they were computed from.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::linkography::Move;
use crate::session::{Interaction, SessionArtifacts, SessionRecord};

/// Storage trait for database operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a new session.
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>>;
    /// All sessions ordered by id.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>>;
    /// Bump a session's `updated_at`.
    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> StorageResult<()>;

    // Transcript operations

    /// Append a move. Fails if the session already has a move at that index.
    async fn append_move(&self, session_id: &str, design_move: &Move) -> StorageResult<()>;
    /// Moves of a session by index, embeddings included.
    async fn get_moves(&self, session_id: &str) -> StorageResult<Vec<Move>>;
    /// Append an interaction. Fails if the turn number is already taken.
    async fn append_interaction(&self, interaction: &Interaction) -> StorageResult<()>;
    /// Interactions of a session by turn.
    async fn get_interactions(&self, session_id: &str) -> StorageResult<Vec<Interaction>>;

    // Derived cache

    /// Cached artefacts, only if they were derived from `content_hash`.
    async fn get_artifacts(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> StorageResult<Option<SessionArtifacts>>;
    /// Replace the cached artefacts of a session.
    async fn put_artifacts(
        &self,
        session_id: &str,
        artifacts: &SessionArtifacts,
    ) -> StorageResult<()>;
}
