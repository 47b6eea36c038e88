use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("LLM rate limited: {message}")]
    RateLimited { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether the failure is worth another attempt within the retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Unavailable { .. }
            | LlmError::RateLimited { .. }
            | LlmError::Timeout { .. }
            | LlmError::Http(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::InvalidResponse { .. } => false,
        }
    }
}

/// Embedding backend errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Agent-boundary errors. These never cross the orchestrator boundary; the
/// orchestrator converts them into degraded replies.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent {agent} degraded: {reason}")]
    Degraded { agent: String, reason: String },

    #[error("Agent {agent} cancelled after {deadline_ms}ms")]
    Cancelled { agent: String, deadline_ms: u64 },

    #[error("Input rejected by safety validator: {reason}")]
    Rejected { reason: String },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::InvalidState {
            message: "no session".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid state: no session");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "server down".to_string(),
            retries: 2,
        };
        assert_eq!(err.to_string(), "LLM unavailable: server down (retries: 2)");

        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LlmError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_llm_error_transience() {
        assert!(LlmError::RateLimited {
            message: "slow down".to_string()
        }
        .is_transient());
        assert!(LlmError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!LlmError::Api {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!LlmError::InvalidResponse {
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::Cancelled {
            agent: "domain_expert".to_string(),
            deadline_ms: 1500,
        };
        assert_eq!(
            err.to_string(),
            "Agent domain_expert cancelled after 1500ms"
        );
    }

    #[test]
    fn test_error_conversions_to_app_error() {
        let app_err: AppError = StorageError::SessionNotFound {
            session_id: "x".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));

        let app_err: AppError = LlmError::Timeout { timeout_ms: 1 }.into();
        assert!(matches!(app_err, AppError::Llm(_)));

        let app_err: AppError = EmbeddingError::Unavailable {
            message: "down".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Embedding(_)));
    }
}
