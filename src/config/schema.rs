use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Role observer tuning
    #[serde(default)]
    pub observer: ObserverConfig,
    /// Role-query action services
    #[serde(default)]
    pub action: ActionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
            observer: ObserverConfig::default(),
            action: ActionConfig::default(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// gRPC health service listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    3501
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
        }
    }
}

impl ServerConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

/// Prometheus endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9501".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_addr(),
        }
    }
}

// ============================================================================
// Observer Configuration
// ============================================================================

/// Raw observer settings, before clamping
///
/// Values are kept exactly as configured. `ObserverSettings` (in the observer
/// module) applies the allowed ranges.
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    /// Log a diagnostic every N consecutive failures (clamped to [300, 3600])
    #[serde(default = "default_failed_event_report_frequency")]
    pub failed_event_report_frequency: i64,
    /// Unchanged-observation window for periodic refreshes (clamped to [60, 300])
    #[serde(default = "default_role_detection_threshold")]
    pub role_detection_threshold: i64,
    /// Readiness probe timeout in seconds, 0 disables the bound
    #[serde(default = "default_role_probe_timeout_secs")]
    pub role_probe_timeout_secs: u64,
}

fn default_failed_event_report_frequency() -> i64 {
    1800
}

fn default_role_detection_threshold() -> i64 {
    300
}

fn default_role_probe_timeout_secs() -> u64 {
    2
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            failed_event_report_frequency: default_failed_event_report_frequency(),
            role_detection_threshold: default_role_detection_threshold(),
            role_probe_timeout_secs: default_role_probe_timeout_secs(),
        }
    }
}

// ============================================================================
// Action Chain Configuration
// ============================================================================

/// Local role-query services, queried in list order
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub ports: Vec<u16>,
    /// TCP connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout including the body (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
