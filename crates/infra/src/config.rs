//! Runtime configuration from the environment (and an optional `.env`).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "studyhub-dev-secret";
const DEFAULT_STORAGE_BUCKET: &str = "materials";
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub url: String,
    pub bucket: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres store when set, in-memory otherwise.
    pub database_url: Option<String>,
    /// Publish jobs to Redis instead of the in-process queue.
    pub redis_url: Option<String>,
    /// Static placeholder questions when unset.
    pub question_service_url: Option<String>,
    /// Blob removals are only recorded when unset.
    pub storage: Option<StorageConfig>,
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(dotenvy::Error::Io(_)) => {}
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                message: e.to_string(),
            })?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let storage = get("STORAGE_URL").map(|url| StorageConfig {
            url,
            bucket: get("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            api_key: get("STORAGE_API_KEY"),
        });

        let poll_ms: u64 = parse_or("WORKER_POLL_INTERVAL_MS", get("WORKER_POLL_INTERVAL_MS"), DEFAULT_POLL_INTERVAL_MS)?;
        let max_attempts: u32 = parse_or("JOB_MAX_ATTEMPTS", get("JOB_MAX_ATTEMPTS"), DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "JOB_MAX_ATTEMPTS",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            question_service_url: get("QUESTION_SERVICE_URL"),
            storage,
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(poll_ms),
                max_attempts,
                ..WorkerConfig::default()
            },
        })
    }

    /// In-memory everything; for tests.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            database_url: None,
            redis_url: None,
            question_service_url: None,
            storage: None,
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: format!("'{v}': {e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert!(config.database_url.is_none());
        assert!(config.storage.is_none());
        assert_eq!(config.worker, WorkerConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let config = from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/studyhub"),
            ("QUESTION_SERVICE_URL", "http://gen.local"),
            ("STORAGE_URL", "http://storage.local"),
            ("STORAGE_API_KEY", "key"),
            ("WORKER_POLL_INTERVAL_MS", "250"),
            ("JOB_MAX_ATTEMPTS", "3"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/studyhub"));
        assert_eq!(config.question_service_url.as_deref(), Some("http://gen.local"));
        let storage = config.storage.unwrap();
        assert_eq!(storage.bucket, "materials");
        assert_eq!(storage.api_key.as_deref(), Some("key"));
        assert_eq!(config.worker.poll_interval, Duration::from_millis(250));
        assert_eq!(config.worker.max_attempts, 3);
    }

    #[test]
    fn empty_values_are_unset() {
        let config = from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(matches!(
            from(&[("JOB_MAX_ATTEMPTS", "many")]),
            Err(ConfigError::Invalid { key: "JOB_MAX_ATTEMPTS", .. })
        ));
        assert!(matches!(
            from(&[("JOB_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::Invalid { key: "JOB_MAX_ATTEMPTS", .. })
        ));
        assert!(matches!(from(&[("BIND_ADDR", "nowhere")]), Err(ConfigError::Invalid { .. })));
    }
}
