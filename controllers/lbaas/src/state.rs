//! Persisted service state
//!
//! The caller owns where per-service load-balancer state lives. The driver
//! only asks for it to be saved after edits or cleared when the load balancer
//! it describes is gone.

use crate::error::Result;
use crate::objects::{LbaasState, LoadBalancer};
use tracing::debug;

/// Persistence hook for per-service load-balancer state
#[async_trait::async_trait]
pub trait LbaasStateStore: Send + Sync {
    /// Forget everything recorded for `loadbalancer`'s service
    async fn clear(&self, loadbalancer: &LoadBalancer) -> Result<()>;

    /// Persist `state`
    async fn save(&self, state: &LbaasState) -> Result<()>;
}

/// Store that persists nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStateStore;

#[async_trait::async_trait]
impl LbaasStateStore for NoopStateStore {
    async fn clear(&self, loadbalancer: &LoadBalancer) -> Result<()> {
        debug!("Not clearing state of {}, no store configured", loadbalancer.name);
        Ok(())
    }

    async fn save(&self, _state: &LbaasState) -> Result<()> {
        Ok(())
    }
}
