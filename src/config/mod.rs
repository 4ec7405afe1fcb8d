mod schema;

pub use schema::*;

use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// Failed-event report frequency (count-based modulus, despite the name)
pub const ENV_FAILED_EVENT_REPORT_FREQUENCY: &str = "KB_FAILED_EVENT_REPORT_FREQUENCY";
/// Unchanged-observation threshold
pub const ENV_ROLE_DETECTION_THRESHOLD: &str = "KB_ROLE_DETECTION_THRESHOLD";
/// JSON array of action service ports
pub const ENV_ACTION_SVC_LIST: &str = "KB_CONSENSUS_SET_ACTION_SVC_LIST";
/// Readiness probe timeout in seconds
pub const ENV_ROLE_PROBE_TIMEOUT: &str = "KB_ROLE_PROBE_TIMEOUT";
/// gRPC listener port
pub const ENV_OBSERVATION_PORT: &str = "KB_ROLE_OBSERVATION_PORT";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Apply environment overrides from the process environment.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides using the given lookup function.
///
/// Unparsable values are logged and skipped so a single bad variable does not
/// take the probe down.
pub fn apply_overrides_with<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let apply = |name: &'static str, result: Result<(), ConfigError>| {
        if let Err(e) = result {
            warn!(name = name, error = %e, "Ignoring environment override");
        }
    };

    if let Some(raw) = lookup(ENV_FAILED_EVENT_REPORT_FREQUENCY) {
        apply(
            ENV_FAILED_EVENT_REPORT_FREQUENCY,
            parse_int(ENV_FAILED_EVENT_REPORT_FREQUENCY, &raw)
                .map(|v| config.observer.failed_event_report_frequency = v),
        );
    }

    if let Some(raw) = lookup(ENV_ROLE_DETECTION_THRESHOLD) {
        apply(
            ENV_ROLE_DETECTION_THRESHOLD,
            parse_int(ENV_ROLE_DETECTION_THRESHOLD, &raw)
                .map(|v| config.observer.role_detection_threshold = v),
        );
    }

    if let Some(raw) = lookup(ENV_ROLE_PROBE_TIMEOUT) {
        apply(
            ENV_ROLE_PROBE_TIMEOUT,
            parse_int(ENV_ROLE_PROBE_TIMEOUT, &raw).and_then(|v| {
                u64::try_from(v)
                    .map(|secs| config.observer.role_probe_timeout_secs = secs)
                    .map_err(|_| ConfigError::InvalidEnv {
                        name: ENV_ROLE_PROBE_TIMEOUT,
                        reason: format!("negative timeout {}", v),
                    })
            }),
        );
    }

    if let Some(raw) = lookup(ENV_ACTION_SVC_LIST) {
        apply(
            ENV_ACTION_SVC_LIST,
            parse_port_list(&raw).map(|ports| config.action.ports = ports),
        );
    }

    if let Some(raw) = lookup(ENV_OBSERVATION_PORT) {
        apply(
            ENV_OBSERVATION_PORT,
            raw.trim()
                .parse::<u16>()
                .map(|port| config.server.listen_port = port)
                .map_err(|e| ConfigError::InvalidEnv {
                    name: ENV_OBSERVATION_PORT,
                    reason: e.to_string(),
                }),
        );
    }
}

fn parse_int(name: &'static str, raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| ConfigError::InvalidEnv {
            name,
            reason: e.to_string(),
        })
}

/// Parse the action service port list
///
/// Accepts a JSON array of integers. An empty (or blank) string means no ports.
pub fn parse_port_list(raw: &str) -> Result<Vec<u16>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<u16>>(raw).map_err(|e| ConfigError::InvalidEnv {
        name: ENV_ACTION_SVC_LIST,
        reason: e.to_string(),
    })
}
