//! Role observation state machine
//!
//! Pure bookkeeping, no I/O: the observer feeds each resolution outcome in and
//! gets back the result to report plus whether the watcher must hear about it.

use tracing::info;

use super::result::OpsResult;
use super::ObserverSettings;

/// Why an observation must be pushed to the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyReason {
    /// Role resolution failed
    Failure,
    /// Resolved role differs from the previous one
    RoleChanged,
    /// Role is stable, periodic re-notification in case an earlier one was lost
    Refresh,
}

impl NotifyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::RoleChanged => "role_changed",
            Self::Refresh => "refresh",
        }
    }
}

/// Outcome of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub result: OpsResult,
    /// Set when the watcher must be notified
    pub reason: Option<NotifyReason>,
}

impl Observation {
    pub fn notify(&self) -> bool {
        self.reason.is_some()
    }
}

/// Point-in-time copy of the observer counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSnapshot {
    pub current_role: String,
    pub consecutive_failures: u64,
    pub unchanged_count: u64,
}

/// Counters and last known role
#[derive(Debug)]
pub struct ObserverState {
    current_role: String,
    consecutive_failures: u64,
    unchanged_count: u64,
    settings: ObserverSettings,
}

impl ObserverState {
    pub fn new(settings: ObserverSettings) -> Self {
        Self {
            current_role: String::new(),
            consecutive_failures: 0,
            unchanged_count: 0,
            settings,
        }
    }

    pub fn current_role(&self) -> &str {
        &self.current_role
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn unchanged_count(&self) -> u64 {
        self.unchanged_count
    }

    pub fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> ObserverSnapshot {
        ObserverSnapshot {
            current_role: self.current_role.clone(),
            consecutive_failures: self.consecutive_failures,
            unchanged_count: self.unchanged_count,
        }
    }

    /// Record a failed resolution. Failures always notify.
    pub fn record_failure(&mut self, message: impl Into<String>) -> Observation {
        let result = OpsResult::failed(message);

        if self.should_log_failure() {
            info!(
                times = self.consecutive_failures,
                message = result.message().unwrap_or_default(),
                "Role checks failed continuously"
            );
        }
        self.consecutive_failures += 1;

        Observation {
            result,
            reason: Some(NotifyReason::Failure),
        }
    }

    /// Whether the next failure emits the periodic diagnostic
    ///
    /// True at failure counts 0, N, 2N, ... for a modulus N.
    pub fn should_log_failure(&self) -> bool {
        self.consecutive_failures % self.settings.failure_log_modulus() == 0
    }

    /// Record a successfully resolved role
    pub fn record_role(&mut self, role: impl Into<String>) -> Observation {
        let role = role.into();
        self.consecutive_failures = 0;

        let result = OpsResult::success(self.current_role.as_str(), role.as_str());
        let mut reason = None;

        if role != self.current_role {
            info!(from = %self.current_role, to = %role, "Role changed");
            self.current_role = role;
            self.unchanged_count = 0;
            reason = Some(NotifyReason::RoleChanged);
        } else {
            self.unchanged_count += 1;
        }

        // The reset here keeps the counter below the threshold, so refreshes
        // continue every `refresh_interval` observations for as long as the
        // role stays stable.
        if self.unchanged_count < self.settings.unchanged_notify_threshold()
            && self.unchanged_count % self.settings.refresh_interval() == 0
        {
            self.unchanged_count = 0;
            reason.get_or_insert(NotifyReason::Refresh);
        }

        Observation { result, reason }
    }
}
