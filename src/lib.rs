//! Role observation sidecar for consensus-replicated database pods
//!
//! The probe resolves this pod's replication role through a chain of local
//! action services, tracks role changes, and reports them to the cluster
//! watcher over the standard gRPC health protocol.

pub mod action;
pub mod config;
pub mod health;
pub mod metrics;
pub mod observer;
