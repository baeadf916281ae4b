//! Application-level configuration loading: turn pacing and room settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "NUMBER_DUEL_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Seconds a participant has before the turn is auto-played.
    pub turn_duration_secs: u32,
    /// Period of the poll channel while a room is active.
    pub poll_interval_ms: u64,
    /// Length of generated invite codes.
    pub code_length: usize,
    /// How many codes to try before giving up on room creation.
    pub max_code_attempts: u32,
    /// Buffer of each session's SSE broadcast channel.
    pub sse_capacity: usize,
    /// Seconds without requests or open streams before a session is reaped.
    pub session_idle_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            turn_duration_secs: 15,
            poll_interval_ms: 2_000,
            code_length: 6,
            max_code_attempts: 5,
            sse_capacity: 32,
            session_idle_timeout_secs: 1_800,
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        turn_duration_secs = config.turn_duration_secs,
                        poll_interval_ms = config.poll_interval_ms,
                        "loaded config"
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

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn parse(contents: &str) -> serde_json::Result<Self> {
        let mut config: Self = serde_json::from_str(contents)?;
        config.turn_duration_secs = config.turn_duration_secs.max(1);
        config.poll_interval_ms = config.poll_interval_ms.max(100);
        config.code_length = config.code_length.clamp(4, 16);
        config.max_code_attempts = config.max_code_attempts.max(1);
        config.sse_capacity = config.sse_capacity.max(1);
        config.session_idle_timeout_secs = config.session_idle_timeout_secs.max(10);
        Ok(config)
    }

    /// Period of the poll channel.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Inactivity after which a session is reaped.
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
