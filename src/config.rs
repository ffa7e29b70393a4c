//! Application-level configuration loading: quiz timing, retry policy and session housekeeping.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SMART_QUIZ_CONFIG_PATH";

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Hard limit for a single question generation attempt.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ai_timeout: Duration,
    /// Pause before the second (and last) generation attempt.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_backoff: Duration,
    /// Upper bound for the question count requested on the retry.
    pub retry_count_cap: u32,
    /// Whether sessions run their own one-second countdown ticker.
    pub auto_tick: bool,
    /// Idle sessions older than this are dropped by the sweeper.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session_ttl: Duration,
    /// Buffered events per session stream before slow subscribers lag.
    pub event_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        ai_timeout_secs = config.ai_timeout.as_secs(),
                        auto_tick = config.auto_tick,
                        "loaded quiz settings from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_timeout: Duration::from_secs(150),
            retry_backoff: Duration::from_secs(2),
            retry_count_cap: 15,
            auto_tick: true,
            session_ttl: Duration::from_secs(60 * 60),
            event_capacity: 32,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"aiTimeout": 30, "autoTick": false}"#).unwrap();
        assert_eq!(config.ai_timeout, Duration::from_secs(30));
        assert!(!config.auto_tick);
        assert_eq!(config.retry_backoff, Duration::from_secs(2));
        assert_eq!(config.retry_count_cap, 15);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<AppConfig>(r#"{"colors": []}"#).is_err());
    }
}
