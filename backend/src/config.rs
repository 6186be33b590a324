//! Configuration management for the Warehouse Stock Ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WSL_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Background scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Recalculation queue configuration
    pub queue: QueueConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Seconds between queue-drain ticks
    pub drain_interval_secs: u64,

    /// Local wall-clock hour of the end-of-day sweep
    pub sweep_hour: u32,

    /// Local wall-clock minute of the end-of-day sweep
    pub sweep_minute: u32,

    /// Offset of local warehouse time from UTC, in minutes
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// Maximum PENDING entries claimed per company per drain tick
    pub batch_size: i64,

    /// Attempts before a FAILED entry stops being retried
    pub max_attempts: i32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WSL_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("scheduler.drain_interval_secs", 900)?
            .set_default("scheduler.sweep_hour", 0)?
            .set_default("scheduler.sweep_minute", 5)?
            .set_default("scheduler.utc_offset_minutes", 0)?
            .set_default("queue.batch_size", 10)?
            .set_default("queue.max_attempts", 5)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WSL_ prefix)
            .add_source(
                Environment::with_prefix("WSL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: 900,
            sweep_hour: 0,
            sweep_minute: 5,
            utc_offset_minutes: 0,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 5,
        }
    }
}
