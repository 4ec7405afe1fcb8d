//! Prometheus metrics for the role probe
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::OnceLock;
use std::time::Duration;

use crate::observer::Observation;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Role probe metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Observations by event (Success / Failed)
    pub observations_total: IntCounterVec,
    /// Watcher notifications by reason
    pub notifications_total: IntCounterVec,
    /// Role transitions
    pub role_changes_total: IntCounter,
    /// Current run of failed observations
    pub consecutive_failures: IntGauge,
    /// Time spent resolving the role through the action chain
    pub resolve_duration_seconds: Histogram,
    /// Health check RPCs by returned status
    pub checks_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics collection
    ///
    /// Metric names and label sets are static, so construction and
    /// registration cannot fail.
    pub fn new() -> Self {
        let registry = Registry::new();

        let observations_total = IntCounterVec::new(
            Opts::new(
                "role_probe_observations_total",
                "Total number of role observations",
            ),
            &["event"],
        )
        .unwrap();

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "role_probe_notifications_total",
                "Total number of observations reported to the watcher",
            ),
            &["reason"], // failure, role_changed, refresh
        )
        .unwrap();

        let role_changes_total = IntCounter::new(
            "role_probe_role_changes_total",
            "Total number of observed role transitions",
        )
        .unwrap();

        let consecutive_failures = IntGauge::new(
            "role_probe_consecutive_failures",
            "Current number of consecutive failed role checks",
        )
        .unwrap();

        let resolve_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "role_probe_resolve_duration_seconds",
                "Role resolution latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )
        .unwrap();

        let checks_total = IntCounterVec::new(
            Opts::new(
                "role_probe_health_checks_total",
                "Total number of health check RPCs",
            ),
            &["status"], // serving, not_serving, error
        )
        .unwrap();

        registry
            .register(Box::new(observations_total.clone()))
            .unwrap();
        registry
            .register(Box::new(notifications_total.clone()))
            .unwrap();
        registry
            .register(Box::new(role_changes_total.clone()))
            .unwrap();
        registry
            .register(Box::new(consecutive_failures.clone()))
            .unwrap();
        registry
            .register(Box::new(resolve_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(checks_total.clone())).unwrap();

        Self {
            registry,
            observations_total,
            notifications_total,
            role_changes_total,
            consecutive_failures,
            resolve_duration_seconds,
            checks_total,
        }
    }

    /// Record the outcome of an observation
    pub fn record_observation(&self, observation: &Observation, consecutive_failures: u64) {
        let event = observation
            .result
            .event()
            .map(|e| e.as_str())
            .unwrap_or("unknown");
        self.observations_total.with_label_values(&[event]).inc();

        if let Some(reason) = observation.reason {
            self.notifications_total
                .with_label_values(&[reason.as_str()])
                .inc();
            if reason == crate::observer::NotifyReason::RoleChanged {
                self.role_changes_total.inc();
            }
        }

        self.consecutive_failures
            .set(i64::try_from(consecutive_failures).unwrap_or(i64::MAX));
    }

    /// Record role resolution latency
    pub fn observe_resolve_duration(&self, elapsed: Duration) {
        self.resolve_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Record a health check RPC outcome
    pub fn record_check(&self, status: &str) {
        self.checks_total.with_label_values(&[status]).inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (status, content_type, body) = match req.uri().path() {
            "/metrics" => (
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                metrics().gather(),
            ),
            "/health" => (StatusCode::OK, "text/plain", "OK".to_string()),
            _ => (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(content_type),
        );
        Ok(response)
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
