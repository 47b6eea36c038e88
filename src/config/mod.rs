use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub linkography: LinkographyConfig,
    pub metrics: MetricsConfig,
    pub orchestrator: OrchestratorConfig,
    pub output: OutputConfig,
}

/// Chat-completions provider configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Which embedding backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// Deterministic local feature hashing.
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    Http,
}

/// Embedding service configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    pub model_id: String,
    pub base_url: String,
    pub api_key: String,
    pub dimension: usize,
    pub cache_capacity: usize,
    /// Allow batch builds to substitute "no vector" for texts the backend
    /// failed on instead of failing the whole batch.
    pub zero_vector_fallback: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration shared by the LLM and embedding clients
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_backoff_ms: u64,
}

/// Linkograph construction and pattern parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LinkographyConfig {
    pub similarity_threshold: f64,
    pub max_link_range: usize,
    pub lateral_window: usize,
    pub lateral_strong: f64,
    pub critical_threshold: usize,
    pub chunk_window: usize,
    pub chunk_density: f64,
    /// Whether tutor replies become moves in the session linkograph.
    pub include_tutor_moves: bool,
}

/// Normalisation constants for the cognitive mapper
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub link_density_max: f64,
    pub web_count_max: f64,
    pub chunk_count_max: f64,
    pub long_range_min: usize,
    pub progression_gain: f64,
    pub progression_window: usize,
    pub self_correction_weight: f64,
}

/// Workflow execution budgets
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub node_deadline_ms: u64,
    pub recent_messages: usize,
}

/// Where aggregation jobs write their tables
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|_| AppError::Config {
                message: format!("{} has malformed value '{}'", name, raw),
            })
        }
        _ => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, AppError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config {
                message: format!("{} has malformed boolean '{}'", name, raw),
            }),
        },
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        let llm = LlmConfig {
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            base_url: env::var("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            model_id: env::var("LLM_MODEL_ID").unwrap_or(defaults.llm.model_id),
            temperature: parse_var("LLM_TEMPERATURE", defaults.llm.temperature)?,
            max_tokens: parse_var("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
        };

        let backend = match env::var("EMBEDDING_BACKEND")
            .unwrap_or_else(|_| "hashing".to_string())
            .to_lowercase()
            .as_str()
        {
            "hashing" | "local" => EmbeddingBackendKind::Hashing,
            "http" | "openai" => EmbeddingBackendKind::Http,
            other => {
                return Err(AppError::Config {
                    message: format!("EMBEDDING_BACKEND has unknown value '{}'", other),
                })
            }
        };

        let embedding = EmbeddingConfig {
            backend,
            model_id: env::var("EMBEDDING_MODEL_ID").unwrap_or(defaults.embedding.model_id),
            base_url: env::var("EMBEDDING_BASE_URL").unwrap_or(defaults.embedding.base_url),
            api_key: env::var("EMBEDDING_API_KEY").unwrap_or_else(|_| llm.api_key.clone()),
            dimension: parse_var("EMBEDDING_DIMENSION", defaults.embedding.dimension)?,
            cache_capacity: parse_var(
                "EMBEDDING_CACHE_CAPACITY",
                defaults.embedding.cache_capacity,
            )?,
            zero_vector_fallback: parse_bool(
                "EMBEDDING_ZERO_FALLBACK",
                defaults.embedding.zero_vector_fallback,
            )?,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/mentor.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS", defaults.request.timeout_ms)?,
            max_retries: parse_var("MAX_RETRIES", defaults.request.max_retries)?,
            retry_delay_ms: parse_var("RETRY_DELAY_MS", defaults.request.retry_delay_ms)?,
            max_backoff_ms: parse_var("MAX_BACKOFF_MS", defaults.request.max_backoff_ms)?,
        };

        let lg = defaults.linkography;
        let linkography = LinkographyConfig {
            similarity_threshold: parse_var("SIMILARITY_THRESHOLD", lg.similarity_threshold)?,
            max_link_range: parse_var("MAX_LINK_RANGE", lg.max_link_range)?,
            lateral_window: parse_var("LATERAL_WINDOW", lg.lateral_window)?,
            lateral_strong: parse_var("LATERAL_STRONG", lg.lateral_strong)?,
            critical_threshold: parse_var("CRITICAL_THRESHOLD", lg.critical_threshold)?,
            chunk_window: parse_var("CHUNK_WINDOW", lg.chunk_window)?,
            chunk_density: parse_var("CHUNK_DENSITY", lg.chunk_density)?,
            include_tutor_moves: parse_bool("INCLUDE_TUTOR_MOVES", lg.include_tutor_moves)?,
        };

        let mc = defaults.metrics;
        let metrics = MetricsConfig {
            link_density_max: parse_var("LINK_DENSITY_MAX", mc.link_density_max)?,
            web_count_max: parse_var("WEB_COUNT_MAX", mc.web_count_max)?,
            chunk_count_max: parse_var("CHUNK_COUNT_MAX", mc.chunk_count_max)?,
            long_range_min: parse_var("LONG_RANGE_MIN", mc.long_range_min)?,
            progression_gain: parse_var("PROGRESSION_GAIN", mc.progression_gain)?,
            progression_window: parse_var("PROGRESSION_WINDOW", mc.progression_window)?,
            self_correction_weight: parse_var(
                "SELF_CORRECTION_WEIGHT",
                mc.self_correction_weight,
            )?,
        };

        let orchestrator = OrchestratorConfig {
            node_deadline_ms: parse_var(
                "NODE_DEADLINE_MS",
                defaults.orchestrator.node_deadline_ms,
            )?,
            recent_messages: parse_var("RECENT_MESSAGES", defaults.orchestrator.recent_messages)?,
        };

        let output = OutputConfig {
            dir: PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string())),
        };

        let config = Config {
            llm,
            embedding,
            database,
            logging,
            request,
            linkography,
            metrics,
            orchestrator,
            output,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break linkograph or metric invariants.
    pub fn validate(&self) -> Result<(), AppError> {
        let lg = &self.linkography;
        let fail = |message: String| Err(AppError::Config { message });

        if !(0.0..=1.0).contains(&lg.similarity_threshold) {
            return fail(format!(
                "similarity_threshold must be within [0, 1], got {}",
                lg.similarity_threshold
            ));
        }
        if !(0.0..=1.0).contains(&lg.lateral_strong) {
            return fail(format!(
                "lateral_strong must be within [0, 1], got {}",
                lg.lateral_strong
            ));
        }
        if !(0.0..=1.0).contains(&lg.chunk_density) {
            return fail(format!(
                "chunk_density must be within [0, 1], got {}",
                lg.chunk_density
            ));
        }
        if lg.max_link_range == 0 {
            return fail("max_link_range must be at least 1".to_string());
        }
        if lg.chunk_window < 2 {
            return fail("chunk_window must be at least 2".to_string());
        }
        if lg.critical_threshold == 0 {
            return fail("critical_threshold must be at least 1".to_string());
        }
        if self.embedding.dimension == 0 {
            return fail("embedding dimension must be at least 1".to_string());
        }
        if self.embedding.cache_capacity == 0 {
            return fail("embedding cache capacity must be at least 1".to_string());
        }
        if self.embedding.backend == EmbeddingBackendKind::Http
            && self.embedding.base_url.trim().is_empty()
        {
            return fail("EMBEDDING_BASE_URL is required for the http backend".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return fail(format!(
                "llm temperature must be within [0, 2], got {}",
                self.llm.temperature
            ));
        }
        if self.llm.max_tokens == 0 {
            return fail("llm max_tokens must be at least 1".to_string());
        }
        if self.metrics.link_density_max <= 0.0
            || self.metrics.web_count_max <= 0.0
            || self.metrics.chunk_count_max <= 0.0
        {
            return fail("metric normalisation maxima must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            max_tokens: 400,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Hashing,
            model_id: "hashing-384".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            dimension: 384,
            cache_capacity: 4096,
            zero_vector_fallback: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/mentor.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 2,
            retry_delay_ms: 1000,
            max_backoff_ms: 4000,
        }
    }
}

impl Default for LinkographyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.35,
            max_link_range: 15,
            lateral_window: 2,
            lateral_strong: 0.7,
            critical_threshold: 5,
            chunk_window: 5,
            chunk_density: 0.30,
            include_tutor_moves: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            link_density_max: 2.0,
            web_count_max: 3.0,
            chunk_count_max: 3.0,
            long_range_min: 5,
            progression_gain: 10.0,
            progression_window: 3,
            self_correction_weight: 0.1,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            node_deadline_ms: 20000,
            recent_messages: 6,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./output"),
        }
    }
}
