//! # Load Balancer Driver
//!
//! Entry point of the engine. [`LbaasDriver`] exposes ensure/release per
//! resource kind plus the security-rule operations (see [`crate::security`]).
//!
//! Every ensure converges on exactly one backend resource per natural key and
//! returns it with its backend ID. Every release treats "already gone" as
//! success. Both wait for the parent load balancer to be stable first and give
//! up with a "not ready" error once the activation timeout is spent.

use crate::backoff::{Clock, Jitter, ProvisioningTimer, TokioClock};
use crate::cache::TtlCache;
use crate::capabilities::Capabilities;
use crate::config::{DriverConfig, SgMode};
use crate::error::Result;
use crate::objects::{loadbalancer_name, loadbalancer_pool_name};
use crate::provisioning::ProvisioningMonitor;
use crate::state::LbaasStateStore;
use openstack_client::{LoadBalancerClientTrait, NetworkClientTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod l7;
mod listener;
mod loadbalancer;
mod member;
mod pool;

#[cfg(test)]
mod listener_test;
#[cfg(test)]
mod loadbalancer_test;
#[cfg(test)]
mod pool_test;

/// Reconciles load-balancer resources against the backend
pub struct LbaasDriver {
    pub(crate) lbaas: Arc<dyn LoadBalancerClientTrait>,
    pub(crate) network: Arc<dyn NetworkClientTrait>,
    pub(crate) state: Arc<dyn LbaasStateStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) jitter: Jitter,
    pub(crate) config: DriverConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) monitor: ProvisioningMonitor,
    // (project_id, subnet_id) -> CIDR
    pub(crate) subnet_cidrs: TtlCache<(String, String), String>,
    // (project_id, subnet_pool_id) -> prefixes
    pub(crate) pool_prefixes: TtlCache<(String, String), Vec<String>>,
}

impl LbaasDriver {
    /// Detect the backend's capabilities and build a driver around them
    pub async fn connect(
        lbaas: Arc<dyn LoadBalancerClientTrait>,
        network: Arc<dyn NetworkClientTrait>,
        state: Arc<dyn LbaasStateStore>,
        config: DriverConfig,
    ) -> Result<Self> {
        let capabilities = Capabilities::detect(lbaas.as_ref(), config.region_name.as_deref()).await?;
        if capabilities.acls {
            info!("Load balancer listeners support ACLs, isolation is enforced through allowed CIDRs");
        }
        if capabilities.double_listeners {
            info!("Load balancer supports a TCP and a UDP listener on the same port");
        }
        Ok(Self::new(lbaas, network, state, config, capabilities))
    }

    /// Build a driver for already known capabilities
    pub fn new(
        lbaas: Arc<dyn LoadBalancerClientTrait>,
        network: Arc<dyn NetworkClientTrait>,
        state: Arc<dyn LbaasStateStore>,
        config: DriverConfig,
        capabilities: Capabilities,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let jitter = Jitter::default();
        let monitor = build_monitor(&lbaas, &network, &state, &clock, jitter, &config);
        Self {
            subnet_cidrs: TtlCache::new(config.cache_ttl, config.cache_max_entries, clock.clone()),
            pool_prefixes: TtlCache::new(config.cache_ttl, config.cache_max_entries, clock.clone()),
            lbaas,
            network,
            state,
            clock,
            jitter,
            config,
            capabilities,
            monitor,
        }
    }

    /// Replace the time source and jitter of every polling loop
    pub fn with_clock(mut self, clock: Arc<dyn Clock>, jitter: Jitter) -> Self {
        self.monitor = build_monitor(&self.lbaas, &self.network, &self.state, &clock, jitter, &self.config);
        self.subnet_cidrs = TtlCache::new(self.config.cache_ttl, self.config.cache_max_entries, clock.clone());
        self.pool_prefixes = TtlCache::new(self.config.cache_ttl, self.config.cache_max_entries, clock.clone());
        self.clock = clock;
        self.jitter = jitter;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Status poller shared with the security-rule operations
    pub fn monitor(&self) -> &ProvisioningMonitor {
        &self.monitor
    }

    /// Whether a TCP and a UDP listener may share a port
    pub fn double_listeners_supported(&self) -> bool {
        self.capabilities.double_listeners
    }

    pub fn get_service_loadbalancer_name(&self, namespace: &str, service: &str) -> String {
        loadbalancer_name(namespace, service)
    }

    pub fn get_loadbalancer_pool_name(&self, loadbalancer_name: &str, namespace: &str, service: &str) -> String {
        loadbalancer_pool_name(loadbalancer_name, namespace, service)
    }

    /// Timer bounded by the activation timeout
    pub(crate) fn timer(&self, interval: Duration) -> ProvisioningTimer<'_> {
        ProvisioningTimer::new(self.clock.as_ref(), self.jitter, self.config.activation_timeout, interval)
    }
}

fn build_monitor(
    lbaas: &Arc<dyn LoadBalancerClientTrait>,
    network: &Arc<dyn NetworkClientTrait>,
    state: &Arc<dyn LbaasStateStore>,
    clock: &Arc<dyn Clock>,
    jitter: Jitter,
    config: &DriverConfig,
) -> ProvisioningMonitor {
    ProvisioningMonitor::new(
        lbaas.clone(),
        network.clone(),
        state.clone(),
        clock.clone(),
        jitter,
        config.activation_timeout,
        config.enforce_sg_rules || config.sg_mode == SgMode::Create,
    )
}
