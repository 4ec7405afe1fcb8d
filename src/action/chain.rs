use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use crate::config::ActionConfig;

/// Query parameter carrying the previous action's output
pub const LAST_STDOUT_PARAM: &str = "KB_CONSENSUS_SET_LAST_STDOUT";

/// Action services always listen on loopback
const ACTION_HOST: &str = "127.0.0.1";

type HttpClient = Client<HttpConnector, Empty<Bytes>>;

/// Error while resolving the role
///
/// The `Display` text of each variant is what ends up in the `message` field
/// reported to the watcher.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("received status code {0}")]
    Status(u16),

    #[error("Get \"{url}\": {reason}")]
    Request { url: String, reason: String },

    #[error("Get \"{url}\": request timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("context canceled")]
    Cancelled,

    #[error("role probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("invalid action url: {0}")]
    InvalidUrl(String),

    /// Failure reported by a non-HTTP role source
    #[error("{0}")]
    Source(String),
}

/// Settings for the action chain and its shared HTTP client
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Ports queried in order
    pub ports: Vec<u16>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Bound on a whole request, body included
    pub request_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ActionConfig> for ChainConfig {
    fn from(config: &ActionConfig) -> Self {
        Self {
            ports: config.ports.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

impl From<ActionConfig> for ChainConfig {
    fn from(config: ActionConfig) -> Self {
        Self::from(&config)
    }
}

/// Ordered pipeline of role-query requests
///
/// The port list is fixed for the life of the process. All resolutions share
/// one pooled HTTP client; `close_idle_connections` swaps in a fresh one so
/// the old pool is released once in-flight requests finish.
pub struct ActionChain {
    config: ChainConfig,
    client: RwLock<HttpClient>,
}

impl ActionChain {
    pub fn new(config: ChainConfig) -> Self {
        let client = build_client(&config);
        Self {
            config,
            client: RwLock::new(client),
        }
    }

    /// Configured ports, in query order
    pub fn ports(&self) -> &[u16] {
        &self.config.ports
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Resolve the current role
    ///
    /// Each response body becomes the next request's `KB_CONSENSUS_SET_LAST_STDOUT`
    /// parameter byte for byte; the last body is the role. The first failing
    /// port aborts the chain. An empty port list resolves to `""` without any
    /// request.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<String, ActionError> {
        let client = self.client.read().clone();
        let mut carry = Bytes::new();

        for &port in &self.config.ports {
            let uri = role_uri(port, &carry)?;
            let started = Instant::now();

            carry = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(port = port, "Role query cancelled");
                    return Err(ActionError::Cancelled);
                }
                result = self.query(&client, uri) => match result {
                    Ok(body) => body,
                    Err(e) => {
                        debug!(port = port, error = %e, "Role query failed, aborting chain");
                        return Err(e);
                    }
                },
            };

            debug!(
                port = port,
                elapsed_ms = started.elapsed().as_millis() as u64,
                output = %String::from_utf8_lossy(&carry),
                "Role query completed"
            );
        }

        Ok(String::from_utf8_lossy(&carry).into_owned())
    }

    /// Drop pooled idle connections
    ///
    /// Safe to call any number of times. Requests already running keep their
    /// own handle to the previous pool.
    pub fn close_idle_connections(&self) {
        *self.client.write() = build_client(&self.config);
        debug!("Released idle action service connections");
    }

    async fn query(&self, client: &HttpClient, uri: Uri) -> Result<Bytes, ActionError> {
        let url = uri.to_string();
        let request = async {
            let response = client.get(uri).await.map_err(|e| ActionError::Request {
                url: url.clone(),
                reason: error_chain(&e),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ActionError::Status(status.as_u16()));
            }

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ActionError::Request {
                    url: url.clone(),
                    reason: error_chain(&e),
                })?
                .to_bytes();

            Ok(body)
        };

        let outcome = tokio::time::timeout(self.config.request_timeout, request).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                url,
                timeout: self.config.request_timeout,
            }),
        }
    }
}

fn build_client(config: &ChainConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Build `http://127.0.0.1:<port>/role?KB_CONSENSUS_SET_LAST_STDOUT=<carry>`
///
/// The carry is form-urlencoded as raw bytes, so bodies that are not valid
/// UTF-8 reach the next action unchanged.
fn role_uri(port: u16, carry: &[u8]) -> Result<Uri, ActionError> {
    let encoded: String = byte_serialize(carry).collect();
    format!(
        "http://{}:{}/role?{}={}",
        ACTION_HOST, port, LAST_STDOUT_PARAM, encoded
    )
    .parse::<Uri>()
    .map_err(|e| ActionError::InvalidUrl(e.to_string()))
}

/// Flatten an error and its sources into one line
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
