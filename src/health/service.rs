use std::sync::Arc;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::{debug, warn};

use crate::action::{ActionChain, RoleSource};
use crate::metrics::metrics;
use crate::observer::{Observation, RoleObserver};

/// Message returned by `Watch`, the same text an unimplemented Go handler sends
const WATCH_UNIMPLEMENTED: &str = "method Watch not implemented";

/// Error attached to a `Check` outcome
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Observer produced a result without an `event` key
    #[error("CheckRole returns empty")]
    EmptyResult,

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    /// JSON-encoded observation for the watcher
    #[error("{0}")]
    Payload(String),
}

/// Status plus optional error for one `Check` call
#[derive(Debug)]
pub struct CheckOutcome {
    pub status: ServingStatus,
    pub error: Option<CheckError>,
}

impl CheckOutcome {
    fn serving() -> Self {
        Self {
            status: ServingStatus::Serving,
            error: None,
        }
    }

    fn not_serving(error: CheckError) -> Self {
        Self {
            status: ServingStatus::NotServing,
            error: Some(error),
        }
    }

    /// Convert to the RPC result
    ///
    /// A call carrying an error only transmits the error, as status code
    /// `Unknown` with the error text as message. The watcher reads the
    /// observation from that message.
    pub fn into_rpc(self) -> Result<Response<HealthCheckResponse>, Status> {
        match self.error {
            Some(error) => Err(Status::unknown(error.to_string())),
            None => Ok(Response::new(HealthCheckResponse {
                status: self.status as i32,
            })),
        }
    }
}

/// Map an observation onto the two-state health protocol
///
/// - missing `event`: NOT_SERVING with `CheckRole returns empty`
/// - notify: NOT_SERVING with the JSON observation as error
/// - otherwise: SERVING, no error
pub fn encode_observation(observation: &Observation) -> CheckOutcome {
    if !observation.result.has_event() {
        return CheckOutcome::not_serving(CheckError::EmptyResult);
    }

    let payload = match observation.result.to_json() {
        Ok(payload) => payload,
        Err(e) => return CheckOutcome::not_serving(CheckError::Serialize(e)),
    };

    if observation.notify() {
        CheckOutcome::not_serving(CheckError::Payload(payload))
    } else {
        CheckOutcome::serving()
    }
}

/// `grpc.health.v1.Health` backed by a role observer
pub struct RoleHealthService<S = ActionChain> {
    observer: Arc<RoleObserver<S>>,
    /// Process-wide shutdown token; each check runs under a child of it
    shutdown: CancellationToken,
}

impl<S: RoleSource> RoleHealthService<S> {
    pub fn new(observer: Arc<RoleObserver<S>>, shutdown: CancellationToken) -> Self {
        Self { observer, shutdown }
    }

    pub fn observer(&self) -> &Arc<RoleObserver<S>> {
        &self.observer
    }

    /// Observe once and encode the result
    pub async fn check_role(&self) -> CheckOutcome {
        let cancel = self.shutdown.child_token();
        let observation = self.observer.observe(&cancel).await;
        let outcome = encode_observation(&observation);

        match &outcome.error {
            Some(CheckError::Payload(payload)) => {
                metrics().record_check("not_serving");
                debug!(reason = ?observation.reason, payload = %payload, "Notifying watcher");
            }
            Some(e) => {
                metrics().record_check("error");
                warn!(error = %e, "Role check produced no usable result");
            }
            None => metrics().record_check("serving"),
        }

        outcome
    }
}

impl<S: RoleSource + 'static> RoleHealthService<S> {
    /// Wrap into the tonic server type
    pub fn into_server(self) -> HealthServer<Self> {
        HealthServer::new(self)
    }
}

#[tonic::async_trait]
impl<S: RoleSource + 'static> Health for RoleHealthService<S> {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        debug!(service = %request.get_ref().service, "Health check");
        self.check_role().await.into_rpc()
    }

    type WatchStream = BoxStream<'static, Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Err(Status::unimplemented(WATCH_UNIMPLEMENTED))
    }
}
