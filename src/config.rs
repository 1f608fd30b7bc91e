use std::env;
use std::str::FromStr;
use crate::cache::MAX_TTL;
use crate::error::{RankError, RankResult};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Sentiment model configuration
    pub ml: MLConfig,
    /// Rank score weighting
    pub ranking: RankingConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,
    /// Maximum database connections
    pub max_connections: u32,
    /// Statement timeout in milliseconds
    pub statement_timeout_ms: u64,
}

/// Which store backs the rank cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(RankError::ConfigError(format!("Unknown CACHE_BACKEND: {}", other))),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Cache backend selection
    pub backend: CacheBackend,
    /// Redis connection URL
    pub url: String,
    /// Maximum Redis connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Per-command timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Rank entry time-to-live in seconds
    pub default_ttl_secs: u64,
}

/// Sentiment model configuration
#[derive(Debug, Clone)]
pub struct MLConfig {
    /// Path to the sentiment model artifact
    pub model_path: String,
    /// Expected SHA256 of the artifact, verification is skipped when unset
    pub model_sha256: Option<String>,
    /// Maximum review text length accepted by /sentiment
    pub max_text_length: usize,
}

/// Rank score weighting
#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    /// Pseudo-count pulling low-volume rooms toward zero
    pub prior_weight: f64,
    /// Positivity used for reviews without usable text, in [0, 1]
    pub neutral_baseline: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            prior_weight: 2.0,
            neutral_baseline: 0.5,
        }
    }
}

impl RankingConfig {
    /// Validate the weighting parameters
    pub fn validate(&self) -> RankResult<()> {
        if !self.prior_weight.is_finite() || !self.neutral_baseline.is_finite() {
            return Err(RankError::ConfigError("Ranking weights must be finite".to_string()));
        }
        if self.prior_weight < 0.0 {
            return Err(RankError::ConfigError("Prior weight cannot be negative".to_string()));
        }
        if !(0.0..=1.0).contains(&self.neutral_baseline) {
            return Err(RankError::ConfigError("Neutral baseline must be between 0 and 1".to_string()));
        }
        Ok(())
    }
}

/// Parse an environment variable, falling back to a default when unset
fn env_parse<T>(name: &str, default: &str) -> RankResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| RankError::ConfigError(format!("Invalid {}: {}", name, e)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> RankResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Could not load .env file: {}", e);
        }

        let redis_url = match env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port: u16 = env_parse("REDIS_PORT", "6379")?;
                let db: u32 = env_parse("REDIS_DB", "0")?;
                format!("redis://{}:{}/{}", host, port, db)
            }
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("SERVER_PORT", "8000")?,
                request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", "5000")?,
                max_request_size: env_parse("MAX_REQUEST_SIZE", "65536")?, // 64KB
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| RankError::ConfigError("DATABASE_URL is required".to_string()))?,
                max_connections: env_parse("DB_MAX_CONNECTIONS", "10")?,
                statement_timeout_ms: env_parse("DB_STATEMENT_TIMEOUT_MS", "2000")?,
            },
            redis: RedisConfig {
                backend: env_parse("CACHE_BACKEND", "redis")?,
                url: redis_url,
                max_connections: env_parse("REDIS_MAX_CONNECTIONS", "10")?,
                connection_timeout_secs: env_parse("REDIS_CONNECTION_TIMEOUT_SECS", "5")?,
                command_timeout_ms: env_parse("REDIS_COMMAND_TIMEOUT_MS", "250")?,
                default_ttl_secs: env_parse("REDIS_TTL_SECONDS", "3600")?, // 1 hour
            },
            ml: MLConfig {
                model_path: env::var("MODEL_PATH")
                    .unwrap_or_else(|_| "models/sentiment-lexicon.json".to_string()),
                model_sha256: env::var("MODEL_SHA256").ok().filter(|s| !s.trim().is_empty()),
                max_text_length: env_parse("MAX_TEXT_LENGTH", "5000")?,
            },
            ranking: RankingConfig {
                prior_weight: env_parse("RANK_PRIOR_WEIGHT", "2.0")?,
                neutral_baseline: env_parse("RANK_NEUTRAL_BASELINE", "0.5")?,
            },
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> RankResult<()> {
        if self.server.port == 0 {
            return Err(RankError::ConfigError("Server port cannot be 0".to_string()));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(RankError::ConfigError("Request timeout must be greater than 0".to_string()));
        }

        if !self.database.url.starts_with("postgresql://") && !self.database.url.starts_with("postgres://") {
            return Err(RankError::ConfigError(
                "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(RankError::ConfigError("DB_MAX_CONNECTIONS must be greater than 0".to_string()));
        }

        if self.redis.backend == CacheBackend::Redis
            && !self.redis.url.starts_with("redis://")
            && !self.redis.url.starts_with("rediss://")
        {
            return Err(RankError::ConfigError("REDIS_URL must start with redis:// or rediss://".to_string()));
        }

        if self.redis.default_ttl_secs > MAX_TTL.as_secs() {
            return Err(RankError::ConfigError(format!(
                "REDIS_TTL_SECONDS cannot exceed {}",
                MAX_TTL.as_secs()
            )));
        }

        if self.redis.command_timeout_ms == 0 {
            return Err(RankError::ConfigError("Redis command timeout must be greater than 0".to_string()));
        }

        if self.ml.model_path.trim().is_empty() {
            return Err(RankError::ConfigError("MODEL_PATH cannot be empty".to_string()));
        }

        self.ranking.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                request_timeout_ms: 5000,
                max_request_size: 65536, // 64KB
            },
            database: DatabaseConfig {
                url: "".to_string(),
                max_connections: 10,
                statement_timeout_ms: 2000,
            },
            redis: RedisConfig {
                backend: CacheBackend::Redis,
                url: "redis://localhost:6379/0".to_string(),
                max_connections: 10,
                connection_timeout_secs: 5,
                command_timeout_ms: 250,
                default_ttl_secs: 3600, // 1 hour
            },
            ml: MLConfig {
                model_path: "models/sentiment-lexicon.json".to_string(),
                model_sha256: None,
                max_text_length: 5000,
            },
            ranking: RankingConfig::default(),
        }
    }
}
