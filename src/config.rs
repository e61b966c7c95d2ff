use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use chrono::Weekday;
use tracing::{info, warn};


/// Service configuration, read once from the environment at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// Bearer token required for writes; None rejects every write
    pub admin_token: Option<String>,
    pub seed_path: Option<PathBuf>,
    /// Largest chart span accepted by /analytics
    pub max_chart_days: i64,
    pub week_start: Weekday,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    reason: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("TRACKER_PORT", "8080")?,
            db_path: try_load("TRACKER_DB_PATH", "tracker.db")?,
            admin_token: optional("TRACKER_ADMIN_TOKEN"),
            seed_path: optional("TRACKER_SEED_PATH").map(PathBuf::from),
            max_chart_days: try_load("TRACKER_MAX_CHART_DAYS", "3660")?,
            week_start: try_load("TRACKER_WEEK_START", "mon")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("tracker.db"),
            admin_token: None,
            seed_path: None,
            max_chart_days: 3660,
            week_start: Weekday::Mon,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            info!("{key} not set");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError {
                key,
                reason: e.to_string(),
            }
        })
}
