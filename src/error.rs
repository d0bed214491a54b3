//! Top-level error types for Marcus.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Every missing variable is reported at once so a deploy can be fixed in one pass.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Database connection and operation errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to SQLite: {0}")]
    SqliteConnect(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// LLM provider and tool errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key for provider: {0}")]
    MissingProviderKey(String),

    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    /// HTTP 429 or quota wording in the provider's error body.
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LlmError::Cancelled)
    }
}

/// Conversation ownership and lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation {id} not found")]
    NotFound { id: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
