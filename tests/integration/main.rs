//! Integration test entry point
//!
//! Run with: cargo test --test integration
//!
//! Each test starts its own stub action services on ephemeral loopback ports,
//! so no external setup is needed.

mod chain;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use role_probe::action::{ActionChain, ChainConfig, LAST_STDOUT_PARAM};

/// How a stub action service answers
#[derive(Clone)]
pub enum Reply {
    /// 200 with a fixed body
    Body(String),
    /// 200 with a fixed body that need not be UTF-8
    Raw(Vec<u8>),
    /// 200 with a body derived from the received `KB_CONSENSUS_SET_LAST_STDOUT`
    Transform(fn(&str) -> String),
    /// Empty body with the given status
    Status(u16),
    /// Never answer
    Hang,
}

struct StubState {
    reply: Mutex<Reply>,
    received: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

/// Local stand-in for an action service container
pub struct StubAction {
    pub port: u16,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubAction {
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub action service");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(StubState {
            reply: Mutex::new(reply),
            received: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        });

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_role(req, state.clone()));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            port,
            state,
            handle,
        }
    }

    /// Change the reply for subsequent requests
    pub fn set_reply(&self, reply: Reply) {
        *self.state.reply.lock() = reply;
    }

    /// `KB_CONSENSUS_SET_LAST_STDOUT` values received so far, in order
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }

    /// Raw, still percent-encoded query strings received so far
    pub fn queries(&self) -> Vec<String> {
        self.state.queries.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.state.received.lock().len()
    }
}

impl Drop for StubAction {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_role(
    req: Request<Incoming>,
    state: Arc<StubState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let last_stdout = req
        .uri()
        .query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == LAST_STDOUT_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default();

    if req.uri().path() != "/role" {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    }

    state.received.lock().push(last_stdout.clone());
    state
        .queries
        .lock()
        .push(req.uri().query().unwrap_or_default().to_string());
    let reply = state.reply.lock().clone();

    let (status, body) = match reply {
        Reply::Body(body) => (StatusCode::OK, Bytes::from(body)),
        Reply::Raw(body) => (StatusCode::OK, Bytes::from(body)),
        Reply::Transform(f) => (StatusCode::OK, Bytes::from(f(&last_stdout))),
        Reply::Status(code) => (
            StatusCode::from_u16(code).expect("Invalid stub status"),
            Bytes::new(),
        ),
        Reply::Hang => std::future::pending().await,
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    Ok(response)
}

/// Chain over the given stubs with short test timeouts
pub fn chain_for(stubs: &[&StubAction]) -> ActionChain {
    chain_with_timeout(stubs, Duration::from_secs(5))
}

pub fn chain_with_timeout(stubs: &[&StubAction], request_timeout: Duration) -> ActionChain {
    ActionChain::new(ChainConfig {
        ports: stubs.iter().map(|s| s.port).collect(),
        connect_timeout: Duration::from_secs(1),
        request_timeout,
    })
}

/// A loopback port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
