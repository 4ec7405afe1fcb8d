//! gRPC health service for the role watcher
//!
//! This module provides:
//! - `grpc.health.v1.Health` backed by the role observer
//! - The mapping from an observation to SERVING / NOT_SERVING, with the
//!   observation's JSON carried in the call's error when the watcher must act

mod service;

pub use service::{encode_observation, CheckError, CheckOutcome, RoleHealthService};

pub use tonic_health::pb::health_check_response::ServingStatus;
pub use tonic_health::pb::health_server::HealthServer;
pub use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
