//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use rust_decimal::Decimal;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Rate limit: requests per minute per caller
    pub rate_limit_per_minute: i32,

    /// Above this amount, oversight escalates a financial event to a human.
    pub financial_limit: Decimal,

    /// Below this confidence, oversight escalates any event to a human.
    pub confidence_threshold: f64,

    /// Whether agents may execute automatable steps without a human in the
    /// loop at all (when false, everything still escalates regardless of
    /// confidence).
    pub auto_approval_enabled: bool,

    /// Capacity of the in-process event bus history ring.
    pub bus_history_size: usize,

    /// Capacity of the distributed-bridge processed-event dedup set.
    pub processed_set_capacity: usize,

    /// Interval, in seconds, between approval/SOP-step timeout sweeps.
    pub approval_sweep_interval_secs: u64,

    /// Directory `SopRegistry` loads SOP definitions from.
    pub sop_definitions_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RATE_LIMIT_PER_MINUTE"))?;

        let financial_limit = env::var("FINANCIAL_LIMIT")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<i64>()
            .map(Decimal::from)
            .map_err(|_| ConfigError::InvalidValue("FINANCIAL_LIMIT"))?;

        let confidence_threshold = env::var("CONFIDENCE_THRESHOLD")
            .unwrap_or_else(|_| "0.75".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CONFIDENCE_THRESHOLD"))?;

        let auto_approval_enabled = env::var("AUTO_APPROVAL_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("AUTO_APPROVAL_ENABLED"))?;

        let bus_history_size = env::var("BUS_HISTORY_SIZE")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("BUS_HISTORY_SIZE"))?;

        let processed_set_capacity = env::var("PROCESSED_SET_CAPACITY")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PROCESSED_SET_CAPACITY"))?;

        let approval_sweep_interval_secs = env::var("APPROVAL_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("APPROVAL_SWEEP_INTERVAL_SECS"))?;

        let sop_definitions_dir =
            env::var("SOP_DEFINITIONS_DIR").unwrap_or_else(|_| "sops".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            rate_limit_per_minute,
            financial_limit,
            confidence_threshold,
            auto_approval_enabled,
            bus_history_size,
            processed_set_capacity,
            approval_sweep_interval_secs,
            sop_definitions_dir,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
