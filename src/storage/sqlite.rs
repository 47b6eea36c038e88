use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::Storage;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::linkography::Move;
use crate::session::{Interaction, SessionArtifacts, SessionRecord};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());
        Self::connect(&database_url, config.max_connections).await
    }

    /// In-memory database, mostly for tests. A single connection keeps every
    /// query on the same memory database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let metadata = session
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, arm, proficiency, project_context, created_at, updated_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.arm.as_str())
        .bind(session.proficiency.as_str())
        .bind(&session.project_context)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, arm = %session.arm, "Session created");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, arm, proficiency, project_context, created_at, updated_at, metadata
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, arm, proficiency, project_context, created_at, updated_at, metadata
            FROM sessions
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn append_move(&self, session_id: &str, design_move: &Move) -> StorageResult<()> {
        let embedding = design_move
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO moves (id, session_id, idx, author, text, phase, move_type, timestamp, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&design_move.id)
        .bind(session_id)
        .bind(design_move.index as i64)
        .bind(design_move.author.as_str())
        .bind(&design_move.text)
        .bind(design_move.phase.as_str())
        .bind(design_move.move_type.as_str())
        .bind(design_move.timestamp.to_rfc3339())
        .bind(&embedding)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_moves(&self, session_id: &str) -> StorageResult<Vec<Move>> {
        let rows: Vec<MoveRow> = sqlx::query_as(
            r#"
            SELECT id, idx, author, text, phase, move_type, timestamp, embedding
            FROM moves
            WHERE session_id = ?
            ORDER BY idx ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Move::try_from).collect()
    }

    async fn append_interaction(&self, interaction: &Interaction) -> StorageResult<()> {
        let payload = serde_json::to_string(interaction)?;

        sqlx::query(
            r#"
            INSERT INTO interactions (id, session_id, turn, created_at, route, response_type, degraded, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&interaction.id)
        .bind(&interaction.session_id)
        .bind(interaction.turn as i64)
        .bind(interaction.created_at.to_rfc3339())
        .bind(interaction.route.map(|r| r.as_str()))
        .bind(interaction.response_type.as_str())
        .bind(interaction.degraded)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_interactions(&self, session_id: &str) -> StorageResult<Vec<Interaction>> {
        let payloads: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM interactions
            WHERE session_id = ?
            ORDER BY turn ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        payloads
            .into_iter()
            .map(|(p,)| serde_json::from_str(&p).map_err(StorageError::from))
            .collect()
    }

    async fn get_artifacts(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> StorageResult<Option<SessionArtifacts>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM session_artifacts
            WHERE session_id = ? AND content_hash = ?
            "#,
        )
        .bind(session_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn put_artifacts(
        &self,
        session_id: &str,
        artifacts: &SessionArtifacts,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(artifacts)?;

        sqlx::query(
            r#"
            INSERT INTO session_artifacts (session_id, content_hash, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(&artifacts.content_hash)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_column<T: FromStr<Err = String>>(raw: &str) -> StorageResult<T> {
    raw.parse::<T>().map_err(|message| StorageError::Query { message })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    arm: String,
    proficiency: String,
    project_context: String,
    created_at: String,
    updated_at: String,
    metadata: Option<String>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            arm: parse_column(&row.arm)?,
            proficiency: parse_column(&row.proficiency)?,
            project_context: row.project_context,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

#[derive(sqlx::FromRow)]
struct MoveRow {
    id: String,
    idx: i64,
    author: String,
    text: String,
    phase: String,
    move_type: String,
    timestamp: String,
    embedding: Option<String>,
}

impl TryFrom<MoveRow> for Move {
    type Error = StorageError;

    fn try_from(row: MoveRow) -> StorageResult<Self> {
        let embedding = row
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;

        let mut design_move = Move::new(
            row.idx.max(0) as usize,
            parse_column(&row.author)?,
            row.text,
            parse_column(&row.phase)?,
        )
        .with_id(row.id)
        .with_type(parse_column(&row.move_type)?)
        .with_timestamp(parse_timestamp(&row.timestamp));
        design_move.embedding = embedding;
        Ok(design_move)
    }
}
