//! Role observer
//!
//! This module provides:
//! - The failure-detector state machine deciding when the watcher is notified
//! - `OpsResult`, the structured outcome reported for every observation
//! - `RoleObserver`, the single serialized entry point that resolves the role
//!   and updates the state

mod result;
mod state;

pub use result::{OpsEvent, OpsResult, EVENT_KEY, MESSAGE_KEY, ORIGINAL_ROLE_KEY, ROLE_KEY};
pub use state::{NotifyReason, Observation, ObserverSnapshot, ObserverState};

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::action::{ActionChain, ActionError, RoleSource};
use crate::config::ObserverConfig;
use crate::metrics::metrics;

/// Stable-role observations between forced re-notifications
pub const ROLE_REFRESH_INTERVAL: u32 = 10;

const FAILURE_LOG_MODULUS_RANGE: (i64, i64) = (300, 3600);
const UNCHANGED_THRESHOLD_RANGE: (i64, i64) = (60, 300);

/// Clamped observer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverSettings {
    failure_log_modulus: u64,
    unchanged_notify_threshold: u64,
    refresh_interval: u64,
    probe_timeout: Option<Duration>,
}

impl ObserverSettings {
    /// Build settings from raw values, clamping both to their allowed ranges
    pub fn new(failure_log_modulus: i64, unchanged_notify_threshold: i64) -> Self {
        Self {
            failure_log_modulus: clamp(failure_log_modulus, FAILURE_LOG_MODULUS_RANGE),
            unchanged_notify_threshold: clamp(
                unchanged_notify_threshold,
                UNCHANGED_THRESHOLD_RANGE,
            ),
            refresh_interval: ROLE_REFRESH_INTERVAL as u64,
            probe_timeout: None,
        }
    }

    /// Bound each role resolution, `None` for no bound
    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn failure_log_modulus(&self) -> u64 {
        self.failure_log_modulus
    }

    pub fn unchanged_notify_threshold(&self) -> u64 {
        self.unchanged_notify_threshold
    }

    pub fn refresh_interval(&self) -> u64 {
        self.refresh_interval
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self::from(&ObserverConfig::default())
    }
}

impl From<&ObserverConfig> for ObserverSettings {
    fn from(config: &ObserverConfig) -> Self {
        Self::new(
            config.failed_event_report_frequency,
            config.role_detection_threshold,
        )
        .with_probe_timeout(probe_budget(config.role_probe_timeout_secs))
    }
}

impl From<ObserverConfig> for ObserverSettings {
    fn from(config: ObserverConfig) -> Self {
        Self::from(&config)
    }
}

fn clamp(value: i64, (min, max): (i64, i64)) -> u64 {
    value.clamp(min, max) as u64
}

/// 80% of the readiness probe timeout goes to role resolution, the rest is
/// left to the kubelet.
fn probe_budget(timeout_secs: u64) -> Option<Duration> {
    if timeout_secs == 0 {
        return None;
    }
    Some(Duration::from_millis(timeout_secs.saturating_mul(800)))
}

/// Serialized role observer
///
/// The state lock is held across the whole resolve-and-update sequence, so
/// concurrent callers observe one at a time, in lock acquisition order.
pub struct RoleObserver<S = ActionChain> {
    source: S,
    state: Mutex<ObserverState>,
    probe_timeout: Option<Duration>,
}

impl<S: RoleSource> RoleObserver<S> {
    pub fn new(source: S, settings: ObserverSettings) -> Self {
        Self {
            source,
            probe_timeout: settings.probe_timeout(),
            state: Mutex::new(ObserverState::new(settings)),
        }
    }

    /// The role source, e.g. for releasing its connections at shutdown
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one observation
    pub async fn observe(&self, cancel: &CancellationToken) -> Observation {
        let mut state = self.state.lock().await;

        let started = Instant::now();
        let resolved = self.resolve(cancel).await;
        metrics().observe_resolve_duration(started.elapsed());

        let observation = match resolved {
            Ok(role) => state.record_role(role),
            Err(e) => {
                debug!(
                    error = %e,
                    failures = state.consecutive_failures(),
                    "Role check failed"
                );
                state.record_failure(e.to_string())
            }
        };

        metrics().record_observation(&observation, state.consecutive_failures());
        debug!(
            result = ?observation.result,
            reason = ?observation.reason,
            "Role observed"
        );
        observation
    }

    /// Current role and counters
    pub async fn snapshot(&self) -> ObserverSnapshot {
        self.state.lock().await.snapshot()
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Result<String, ActionError> {
        match self.probe_timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.current_role(cancel))
                .await
                .unwrap_or_else(|_| Err(ActionError::ProbeTimeout(limit))),
            None => self.source.current_role(cancel).await,
        }
    }
}
