//! Pool ensure/release

use super::LbaasDriver;
use crate::backoff::FAST_POLL_INTERVAL;
use crate::ensure::{Found, ResourceOps};
use crate::error::{DriverError, Result};
use crate::objects::{key_filters, loadbalancer_pool_name, LbaasObject, Listener, LoadBalancer, Pool};
use crate::provisioning::removed;
use openstack_client::models as api;
use openstack_client::{LbResourceKind, OpenStackError, ProvisioningStatus};
use serde_json::json;
use tracing::warn;

/// Only algorithm pools are created with
const LB_ALGORITHM: &str = "ROUND_ROBIN";

pub(crate) struct PoolOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<Pool> for PoolOps<'_> {
    async fn create(&self, desired: &Pool) -> Result<Pool> {
        let driver = self.0;
        let mut body = json!({
            "name": desired.name,
            "project_id": desired.project_id,
            "loadbalancer_id": desired.loadbalancer_id,
            "protocol": desired.protocol,
            "lb_algorithm": LB_ALGORITHM,
        });
        if let Some(listener_id) = &desired.listener_id {
            body["listener_id"] = json!(listener_id);
        }
        driver
            .capabilities
            .add_tags(LbResourceKind::Pool, &mut body, &driver.config.resource_tags);

        let response: api::Pool = driver.post(LbResourceKind::Pool, None, body).await?;
        Ok(desired.with_id(response.id))
    }

    async fn find(&self, desired: &Pool) -> Result<Option<Found<Pool>>> {
        let key = desired.natural_key();
        let found = self.0.lbaas.pools(&key_filters(&key)).await?;

        let matching = found.into_iter().find(|pool| match &desired.listener_id {
            Some(listener_id) => pool.listeners.iter().any(|l| &l.id == listener_id),
            None => pool.name == desired.name,
        });
        Ok(matching.map(|response| Found {
            resource: desired.with_id(response.id),
            status: response.provisioning_status,
        }))
    }

    async fn delete(&self, pool: &Pool) -> Result<(), OpenStackError> {
        match pool.id.as_deref() {
            Some(id) => self.0.lbaas.delete_pool(id).await,
            None => Ok(()),
        }
    }
}

impl LbaasDriver {
    /// Ensure the default pool behind `listener`
    pub async fn ensure_pool(&self, lb: &LoadBalancer, listener: &Listener) -> Result<Pool> {
        let desired = Pool {
            id: None,
            name: listener.name.clone(),
            project_id: lb.project_id.clone(),
            loadbalancer_id: listener.loadbalancer_id.clone(),
            listener_id: listener.id.clone(),
            protocol: listener.protocol.clone(),
        };
        self.ensure_pool_provisioned(lb, &desired).await
    }

    /// Ensure a pool attached directly to the load balancer, for L7 redirects
    pub async fn ensure_pool_attached_to_lb(
        &self,
        lb: &LoadBalancer,
        namespace: &str,
        service: &str,
        protocol: &str,
    ) -> Result<Pool> {
        let lb_id = lb
            .id
            .clone()
            .ok_or_else(|| DriverError::Integrity(format!("load balancer {} has no id", lb.name)))?;
        let desired = Pool {
            id: None,
            name: loadbalancer_pool_name(&lb.name, namespace, service),
            project_id: lb.project_id.clone(),
            loadbalancer_id: lb_id,
            listener_id: None,
            protocol: protocol.to_string(),
        };
        self.ensure_pool_provisioned(lb, &desired).await
    }

    pub async fn release_pool(&self, lb: &LoadBalancer, pool: &Pool) -> Result<()> {
        self.release(&PoolOps(self), lb, pool).await
    }

    /// Pool by exact name within a project
    pub async fn get_pool_by_name(&self, name: &str, project_id: &str) -> Result<Option<Pool>> {
        let pools = self
            .lbaas
            .pools(&[("name", name), ("project_id", project_id)])
            .await?;

        Ok(pools.into_iter().find(|p| p.name == name).map(|p| Pool {
            id: Some(p.id),
            name: p.name,
            project_id: p.project_id,
            loadbalancer_id: p.loadbalancers.first().map(|r| r.id.clone()).unwrap_or_default(),
            listener_id: p.listeners.first().map(|r| r.id.clone()),
            protocol: p.protocol,
        }))
    }

    async fn ensure_pool_provisioned(&self, lb: &LoadBalancer, desired: &Pool) -> Result<Pool> {
        match self
            .ensure_provisioned(&PoolOps(self), desired, lb, FAST_POLL_INTERVAL)
            .await
        {
            Err(DriverError::Backend(e)) if e.is_not_found() => {
                warn!(
                    "Parent of pool {} is gone, releasing load balancer {} to recreate it",
                    desired.name, lb.name
                );
                self.release_loadbalancer(lb).await?;
                self.state.clear(lb).await?;
                Err(removed(lb, ProvisioningStatus::Deleted))
            }
            other => other,
        }
    }
}
