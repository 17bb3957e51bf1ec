use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DOCKER_SOCKET: &str = "CUBE_DOCKER_SOCKET";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "CUBE_CONNECT_TIMEOUT_SECS";
pub const ENV_CALL_TIMEOUT_SECS: &str = "CUBE_CALL_TIMEOUT_SECS";
pub const ENV_STOP_GRACE_SECS: &str = "CUBE_STOP_GRACE_SECS";
pub const ENV_REMOVE_ON_START_FAILURE: &str = "CUBE_REMOVE_ON_START_FAILURE";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("{var} must be true or false, got {value:?}")]
    InvalidBool { var: &'static str, value: String },
}

/// Runtime endpoint and lifecycle policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unix socket of the engine. `None` uses `DOCKER_HOST` or the platform default.
    pub docker_socket: Option<String>,
    pub connect_timeout_secs: u64,
    /// Deadline applied to each runtime call. `None` means no deadline.
    pub call_timeout_secs: Option<u64>,
    /// Grace period passed to stop. `None` leaves it to the engine.
    pub stop_grace_secs: Option<u64>,
    /// Force-remove a container that was created but failed to start.
    pub remove_on_start_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            docker_socket: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            call_timeout_secs: None,
            stop_grace_secs: None,
            remove_on_start_failure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from `CUBE_*` variables; unknown variables are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut config = Config::default();

        if let Some(socket) = vars.get(ENV_DOCKER_SOCKET).filter(|s| !s.is_empty()) {
            config.docker_socket = Some(socket.clone());
        }
        if let Some(value) = vars.get(ENV_CONNECT_TIMEOUT_SECS) {
            config.connect_timeout_secs = parse_secs(ENV_CONNECT_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = vars.get(ENV_CALL_TIMEOUT_SECS) {
            config.call_timeout_secs = Some(parse_secs(ENV_CALL_TIMEOUT_SECS, value)?);
        }
        if let Some(value) = vars.get(ENV_STOP_GRACE_SECS) {
            config.stop_grace_secs = Some(parse_secs(ENV_STOP_GRACE_SECS, value)?);
        }
        if let Some(value) = vars.get(ENV_REMOVE_ON_START_FAILURE) {
            config.remove_on_start_failure = parse_bool(ENV_REMOVE_ON_START_FAILURE, value)?;
        }

        Ok(config)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn stop_grace(&self) -> Option<Duration> {
        self.stop_grace_secs.map(Duration::from_secs)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidSeconds {
            var,
            value: value.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
