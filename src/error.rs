use thiserror::Error;

/// Main error type for the ranking service
#[derive(Debug, Error)]
pub enum RankError {
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    RedisError(String),

    /// Cache operation error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Cache circuit is open, store calls are skipped
    #[error("Cache unavailable")]
    CacheUnavailable,

    /// Database connection or query error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Sentiment model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RankError {
    /// Check if error comes from the cache layer
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            RankError::RedisError(_) | RankError::CacheError(_) | RankError::CacheUnavailable
        )
    }

    /// Check if error is related to database
    pub fn is_database_error(&self) -> bool {
        matches!(self, RankError::DatabaseError(_))
    }

    /// Check if error is a client input error
    pub fn is_client_error(&self) -> bool {
        matches!(self, RankError::InvalidRequest(_))
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            RankError::InvalidRequest(_) => 400,
            RankError::Timeout => 504,
            RankError::RedisError(_) => 503,
            RankError::CacheError(_) => 503,
            RankError::CacheUnavailable => 503,
            RankError::DatabaseError(_) => 503,
            RankError::ModelError(_) => 500,
            RankError::ConfigError(_) => 500,
            RankError::IoError(_) => 500,
            RankError::SerializationError(_) => 500,
            RankError::Internal(_) => 500,
        }
    }

    /// Short machine-readable error kind for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            RankError::InvalidRequest(_) => "invalid_request",
            RankError::Timeout => "timeout",
            RankError::RedisError(_) => "redis",
            RankError::CacheError(_) => "cache",
            RankError::CacheUnavailable => "cache_unavailable",
            RankError::DatabaseError(_) => "database",
            RankError::ModelError(_) => "model",
            RankError::ConfigError(_) => "config",
            RankError::IoError(_) => "io",
            RankError::SerializationError(_) => "serialization",
            RankError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for ranking operations
pub type RankResult<T> = Result<T, RankError>;

/// Validation error for request parameters
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("locality query param is required")]
    MissingLocality,

    #[error("text is required")]
    MissingText,

    #[error("{field} too long (maximum {max} characters allowed)")]
    TooLong { field: &'static str, max: usize },
}

impl From<ValidationError> for RankError {
    fn from(err: ValidationError) -> Self {
        RankError::InvalidRequest(err.to_string())
    }
}
