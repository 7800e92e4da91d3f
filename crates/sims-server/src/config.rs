//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/sims";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default number of rows per processing batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default retention window for completed jobs (30 minutes).
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 1800;

/// Default ceiling after which a still-running job is considered stale
/// and force-purged (2 hours).
pub const DEFAULT_STALE_JOB_SECS: u64 = 7200;

/// Default interval between registry sweep passes.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default directory for uploaded files awaiting processing.
pub const DEFAULT_UPLOAD_DIR: &str = "./data/uploads";

/// Default directory for failed-record artifacts.
pub const DEFAULT_FAILED_DIR: &str = "./data/failed";

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub retention_secs: u64,
    pub stale_job_secs: u64,
    pub sweep_interval_secs: u64,
    pub upload_dir: PathBuf,
    pub failed_dir: PathBuf,
    /// Optional pause between batches in milliseconds. Off by default;
    /// the original system paced batches for UI visibility only.
    pub batch_pause_ms: Option<u64>,
}

impl IngestConfig {
    pub fn batch_pause(&self) -> Option<Duration> {
        self.batch_pause_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("SIMS_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parsed("SIMS_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parsed(
                    "SIMS_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parsed(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parsed(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parsed(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_parsed(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            ingest: IngestConfig {
                batch_size: env_parsed("SIMS_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                retention_secs: env_parsed("SIMS_JOB_RETENTION_SECS", DEFAULT_JOB_RETENTION_SECS),
                stale_job_secs: env_parsed("SIMS_STALE_JOB_SECS", DEFAULT_STALE_JOB_SECS),
                sweep_interval_secs: env_parsed(
                    "SIMS_SWEEP_INTERVAL_SECS",
                    DEFAULT_SWEEP_INTERVAL_SECS,
                ),
                upload_dir: PathBuf::from(
                    std::env::var("SIMS_UPLOAD_DIR")
                        .unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string()),
                ),
                failed_dir: PathBuf::from(
                    std::env::var("SIMS_FAILED_DIR")
                        .unwrap_or_else(|_| DEFAULT_FAILED_DIR.to_string()),
                ),
                batch_pause_ms: std::env::var("SIMS_BATCH_PAUSE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                allow_credentials: env_parsed("CORS_ALLOW_CREDENTIALS", true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.ingest.batch_size == 0 {
            anyhow::bail!("Ingest batch_size must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            ingest: IngestConfig {
                batch_size: DEFAULT_BATCH_SIZE,
                retention_secs: DEFAULT_JOB_RETENTION_SECS,
                stale_job_secs: DEFAULT_STALE_JOB_SECS,
                sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
                upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
                failed_dir: PathBuf::from(DEFAULT_FAILED_DIR),
                batch_pause_ms: None,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_connections_cannot_exceed_max() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        config.database.max_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_pause_disabled_by_default() {
        let config = Config::default();
        assert_eq!(config.ingest.batch_pause(), None);

        let mut config = config;
        config.ingest.batch_pause_ms = Some(0);
        assert_eq!(config.ingest.batch_pause(), None);

        config.ingest.batch_pause_ms = Some(250);
        assert_eq!(
            config.ingest.batch_pause(),
            Some(Duration::from_millis(250))
        );
    }
}
