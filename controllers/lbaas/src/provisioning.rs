//! # Provisioning Monitor
//!
//! Waits for a load balancer to become stable before anything touches it.
//!
//! A load balancer found in ERROR is purged (cascade delete, wait until it is
//! gone, drop the engine-owned security group) and its persisted state cleared.
//! The caller then sees [`DriverError::Removed`] and rebuilds from scratch. The
//! purge does not go back through the release loop, so a load balancer stuck
//! in ERROR cannot recurse into another wait.

use crate::backoff::{Clock, Jitter, ProvisioningTimer, FAST_POLL_INTERVAL};
use crate::error::{DriverError, Result};
use crate::objects::LoadBalancer;
use crate::security::find_lb_security_group;
use crate::state::LbaasStateStore;
use openstack_client::{LoadBalancerClientTrait, NetworkClientTrait, ProvisioningStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Polls load balancer status on behalf of the driver
#[derive(Clone)]
pub struct ProvisioningMonitor {
    lbaas: Arc<dyn LoadBalancerClientTrait>,
    network: Arc<dyn NetworkClientTrait>,
    state: Arc<dyn LbaasStateStore>,
    clock: Arc<dyn Clock>,
    jitter: Jitter,
    activation_timeout: Duration,
    release_security_group: bool,
}

impl ProvisioningMonitor {
    pub fn new(
        lbaas: Arc<dyn LoadBalancerClientTrait>,
        network: Arc<dyn NetworkClientTrait>,
        state: Arc<dyn LbaasStateStore>,
        clock: Arc<dyn Clock>,
        jitter: Jitter,
        activation_timeout: Duration,
        release_security_group: bool,
    ) -> Self {
        Self {
            lbaas,
            network,
            state,
            clock,
            jitter,
            activation_timeout,
            release_security_group,
        }
    }

    /// Wait until `lb` is ACTIVE.
    ///
    /// Returns [`DriverError::Removed`] when the load balancer turned out to be
    /// in ERROR (it is purged first) or is already gone, and
    /// [`DriverError::LoadBalancerNotReady`] when `timeout` runs out.
    pub async fn wait_for_provisioning(&self, lb: &LoadBalancer, timeout: Duration, interval: Duration) -> Result<()> {
        let lb_id = require_id(lb)?;
        let mut timer = ProvisioningTimer::new(self.clock.as_ref(), self.jitter, timeout, interval);
        let mut status = ProvisioningStatus::Unknown;

        while let Some(remaining) = timer.tick().await {
            let response = match self.lbaas.get_load_balancer(lb_id).await {
                Ok(response) => response,
                Err(e) if e.is_not_found() => {
                    warn!("Load balancer {} ({}) no longer exists", lb.name, lb_id);
                    self.state.clear(lb).await?;
                    return Err(removed(lb, ProvisioningStatus::Deleted));
                }
                Err(e) => return Err(e.into()),
            };

            status = response.provisioning_status;
            match status {
                ProvisioningStatus::Active => {
                    debug!("Provisioning complete for {} ({})", lb.name, lb_id);
                    return Ok(());
                }
                ProvisioningStatus::Error => {
                    warn!("Load balancer {} ({}) is in ERROR, releasing it", lb.name, lb_id);
                    self.purge(lb, lb_id).await;
                    self.state.clear(lb).await?;
                    return Err(removed(lb, status));
                }
                ProvisioningStatus::Deleted => {
                    warn!("Load balancer {} ({}) was deleted", lb.name, lb_id);
                    self.state.clear(lb).await?;
                    return Err(removed(lb, status));
                }
                _ => debug!(
                    "Provisioning status {} for {}, {}s remaining until timeout",
                    status,
                    lb.name,
                    remaining.as_secs()
                ),
            }
        }

        Err(DriverError::LoadBalancerNotReady {
            id: lb_id.to_string(),
            status: status.to_string(),
        })
    }

    /// Wait until `lb` is gone, repeating the cascade delete while the backend
    /// still reports it as anything but deleting
    pub async fn wait_for_deletion(&self, lb: &LoadBalancer, timeout: Duration) -> Result<()> {
        let lb_id = require_id(lb)?;
        let mut timer = ProvisioningTimer::new(self.clock.as_ref(), self.jitter, timeout, FAST_POLL_INTERVAL);
        let mut status = ProvisioningStatus::Unknown;

        while timer.tick().await.is_some() {
            let response = match self.lbaas.get_load_balancer(lb_id).await {
                Ok(response) => response,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            status = response.provisioning_status;
            if status.is_deleting() {
                debug!("Load balancer {} is {}", lb_id, status);
                continue;
            }

            warn!("Load balancer {} still {} after delete, deleting again", lb_id, status);
            match self.lbaas.delete_load_balancer(lb_id, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => warn!("Repeated delete of load balancer {} failed: {}", lb_id, e),
            }
        }

        Err(DriverError::LoadBalancerNotReady {
            id: lb_id.to_string(),
            status: status.to_string(),
        })
    }

    // Best effort. Errors are logged, not returned.
    async fn purge(&self, lb: &LoadBalancer, lb_id: &str) {
        match self.lbaas.delete_load_balancer(lb_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => error!("Failed to delete load balancer {} in ERROR: {}", lb_id, e),
        }

        match self.wait_for_deletion(lb, self.activation_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_not_ready() => debug!("Load balancer {} not deleted yet: {}", lb_id, e),
            Err(e) => error!("Failed waiting for deletion of load balancer {}: {}", lb_id, e),
        }

        if !self.release_security_group {
            return;
        }
        match find_lb_security_group(self.network.as_ref(), lb, None).await {
            Ok(Some(sg_id)) => match self.network.delete_security_group(&sg_id).await {
                Ok(()) => debug!("Deleted security group {} of {}", sg_id, lb.name),
                Err(e) if e.is_not_found() => {}
                Err(e) => error!("Failed to delete security group {} of {}: {}", sg_id, lb.name, e),
            },
            Ok(None) => {}
            Err(e) => error!("Failed to look up security group of {}: {}", lb.name, e),
        }
    }
}

fn require_id(lb: &LoadBalancer) -> Result<&str> {
    lb.id
        .as_deref()
        .ok_or_else(|| DriverError::Integrity(format!("load balancer {} has no id", lb.name)))
}

pub(crate) fn removed(lb: &LoadBalancer, status: ProvisioningStatus) -> DriverError {
    DriverError::Removed {
        kind: "loadbalancer".to_string(),
        id: lb.id.clone().unwrap_or_default(),
        name: lb.name.clone(),
        state: status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use openstack_client::{LbResourceKind, MockFailure, MockLoadBalancerClient, MockNetworkClient};

    fn monitor(lbaas: &MockLoadBalancerClient, network: &MockNetworkClient, store: &RecordingStateStore) -> ProvisioningMonitor {
        ProvisioningMonitor::new(
            Arc::new(lbaas.clone()),
            Arc::new(network.clone()),
            Arc::new(store.clone()),
            Arc::new(ManualClock::new()),
            Jitter::Fixed(0.8),
            Duration::from_secs(60),
            true,
        )
    }

    #[tokio::test]
    async fn test_active_returns_immediately() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::Active);

        monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(10), FAST_POLL_INTERVAL)
            .await
            .unwrap();
        assert_eq!(lbaas.call_count("get_load_balancer"), 1);
    }

    #[tokio::test]
    async fn test_pending_then_active() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::PendingCreate);
        let id = lb.id.clone().unwrap();
        lbaas.script_statuses(
            &id,
            &[
                ProvisioningStatus::PendingCreate,
                ProvisioningStatus::PendingUpdate,
                ProvisioningStatus::Active,
            ],
        );

        monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(60), FAST_POLL_INTERVAL)
            .await
            .unwrap();
        assert_eq!(lbaas.call_count("get_load_balancer"), 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_last_status() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::PendingUpdate);

        let err = monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(5), FAST_POLL_INTERVAL)
            .await
            .unwrap_err();
        match err {
            DriverError::LoadBalancerNotReady { id, status } => {
                assert_eq!(Some(id), lb.id);
                assert_eq!(status, "PENDING_UPDATE");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.cleared().is_empty());
    }

    #[tokio::test]
    async fn test_error_purges_and_reports_removed() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::Error);
        let sg_id = seed_lb_security_group(&network, &lb);
        let mut lb = lb;
        lb.security_groups.push(sg_id.clone());

        let err = monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(60), FAST_POLL_INTERVAL)
            .await
            .unwrap_err();

        assert!(err.is_removed());
        assert_eq!(lbaas.call_count("delete_load_balancer"), 1);
        assert_eq!(lbaas.count(LbResourceKind::LoadBalancer), 0);
        assert!(network.security_group(&sg_id).is_none());
        assert_eq!(store.cleared(), vec![lb.name.clone()]);
    }

    #[tokio::test]
    async fn test_missing_load_balancer_clears_state() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let mut lb = desired_loadbalancer();
        lb.id = Some("gone".to_string());

        let err = monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(60), FAST_POLL_INTERVAL)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Removed { ref state, .. } if state == "DELETED"));
        assert_eq!(store.cleared().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::Active);
        lbaas.inject_failure("get_load_balancer", MockFailure::Transport, 1);

        let err = monitor(&lbaas, &network, &store)
            .wait_for_provisioning(&lb, Duration::from_secs(60), FAST_POLL_INTERVAL)
            .await
            .unwrap_err();
        assert!(err.backend().is_some());
    }

    #[tokio::test]
    async fn test_wait_for_deletion_repeats_ignored_delete() {
        let lbaas = MockLoadBalancerClient::new();
        let network = MockNetworkClient::new();
        let store = RecordingStateStore::default();
        let lb = seed_loadbalancer(&lbaas, ProvisioningStatus::Active);
        lbaas.ignore_deletes(1);
        lbaas.delete_load_balancer(lb.id.as_deref().unwrap(), true).await.unwrap();

        monitor(&lbaas, &network, &store)
            .wait_for_deletion(&lb, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(lbaas.call_count("delete_load_balancer"), 2);
        assert_eq!(lbaas.count(LbResourceKind::LoadBalancer), 0);
    }
}
