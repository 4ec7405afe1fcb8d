//! Role resolution through local action services
//!
//! Each pod runs one or more small HTTP helpers ("action services"), one per
//! port. The chain queries them in order and feeds each helper the previous
//! helper's output, so multi-step role checks can be composed from scripts.

mod chain;

pub use chain::{ActionChain, ActionError, ChainConfig, LAST_STDOUT_PARAM};

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Anything that can tell the observer which role this pod currently holds
pub trait RoleSource: Send + Sync {
    /// Resolve the current role, aborting when `cancel` fires
    fn current_role(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, ActionError>> + Send;
}

impl RoleSource for ActionChain {
    fn current_role(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, ActionError>> + Send {
        self.resolve(cancel)
    }
}
