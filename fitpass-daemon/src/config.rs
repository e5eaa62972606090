//! Daemon configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fitpass_core::{EnrollmentPolicy, Thresholds};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 5_000;

/// Settings read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub max_connections: u32,
    /// Deadline for one enrollment transaction.
    pub transaction_timeout: Duration,
    pub policy: EnrollmentPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All optional:
    /// - `FITPASS_DB_PATH` (default: `<data_local_dir>/fitpass/fitpass.db`)
    /// - `FITPASS_DB_MAX_CONNECTIONS` (default: 10)
    /// - `FITPASS_TX_TIMEOUT_MS` (default: 5000)
    /// - `EMBEDDING_DIMS` (default: 512)
    /// - `THRESHOLD_SIM`, `THRESHOLD_LIVENESS`, `THRESHOLD_QUALITY`
    ///   (defaults: 0.9, 0.8, 0.85)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("FITPASS_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let max_connections = parse_var(
            &lookup,
            "FITPASS_DB_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
        )?;
        if max_connections == 0 {
            return Err(ConfigError::invalid(
                "FITPASS_DB_MAX_CONNECTIONS",
                "0",
                "must be at least 1",
            ));
        }

        let timeout_ms = parse_var(
            &lookup,
            "FITPASS_TX_TIMEOUT_MS",
            DEFAULT_TRANSACTION_TIMEOUT_MS,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::invalid("FITPASS_TX_TIMEOUT_MS", "0", "must be positive"));
        }

        let embedding_dims = parse_var(
            &lookup,
            "EMBEDDING_DIMS",
            EnrollmentPolicy::DEFAULT_EMBEDDING_DIMS,
        )?;
        if embedding_dims == 0 {
            return Err(ConfigError::invalid("EMBEDDING_DIMS", "0", "must be positive"));
        }

        let thresholds = Thresholds {
            similarity: parse_threshold(
                &lookup,
                "THRESHOLD_SIM",
                EnrollmentPolicy::DEFAULT_SIMILARITY,
            )?,
            liveness: parse_threshold(
                &lookup,
                "THRESHOLD_LIVENESS",
                EnrollmentPolicy::DEFAULT_LIVENESS,
            )?,
            quality: parse_threshold(
                &lookup,
                "THRESHOLD_QUALITY",
                EnrollmentPolicy::DEFAULT_QUALITY,
            )?,
        };

        Ok(Self {
            db_path,
            max_connections,
            transaction_timeout: Duration::from_millis(timeout_ms),
            policy: EnrollmentPolicy {
                embedding_dims,
                thresholds,
            },
        })
    }
}

/// `<data_local_dir>/fitpass/fitpass.db`, or `./fitpass/fitpass.db`.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fitpass")
        .join("fitpass.db")
}

fn parse_var<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, &raw, &e.to_string())),
    }
}

fn parse_threshold<F>(lookup: &F, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_var(lookup, key, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(key, &value.to_string(), "must be within [0, 1]"));
    }
    Ok(value)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &str) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
