//! Error types for the Podium ranking engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the ranking engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Caller-facing Errors
    // =========================================================================
    /// Entity absent from the Score Store
    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: String },

    /// Invalid page, page size or entity id
    #[error("Validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Cache Tier Errors
    // =========================================================================
    /// Backing cache tier closed or unreachable
    #[error("Cache tier unavailable: {0}")]
    CacheUnavailable(String),

    /// A rebuild is already running
    #[error("Rebuild already in progress")]
    RebuildInProgress,

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Score Store read failed
    #[error("Score store error: {0}")]
    ScoreStore(String),

    /// Derived-count provider failed for an entity
    #[error("Derived counts unavailable for {entity_id}: {reason}")]
    DerivedCounts { entity_id: String, reason: String },

    /// Request-scoped timeout elapsed
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::CacheUnavailable(_)
                | Error::ScoreStore(_)
                | Error::DerivedCounts { .. }
                | Error::RebuildInProgress
        )
    }

    /// Whether the message is safe to show to an end user.
    ///
    /// Everything else is reported through a generic failure indicator.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Validation(_))
    }

    pub(crate) fn not_found(entity_id: impl Into<String>) -> Self {
        Error::NotFound {
            entity_id: entity_id.into(),
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(error: prometheus::Error) -> Self {
        Error::Metrics(error.to_string())
    }
}
