//! Load balancer ensure/release
//!
//! Unlike the child resources, a load balancer is looked up before it is
//! created: creating one is slow and a duplicate would cost a VIP.

use super::LbaasDriver;
use crate::config::SgMode;
use crate::ensure::{Found, ResourceOps};
use crate::error::{DriverError, Result};
use crate::objects::{key_filters, LbaasObject, LoadBalancer};
use crate::provisioning::removed;
use crate::security::find_lb_security_group;
use openstack_client::models as api;
use openstack_client::{LbResourceKind, OpenStackError, ProvisioningStatus};
use serde_json::json;
use tracing::{debug, error, warn};

pub(crate) struct LoadBalancerOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<LoadBalancer> for LoadBalancerOps<'_> {
    async fn create(&self, desired: &LoadBalancer) -> Result<LoadBalancer> {
        let driver = self.0;
        let mut body = json!({
            "name": desired.name,
            "project_id": desired.project_id,
            "vip_address": desired.ip.to_string(),
            "vip_subnet_id": desired.subnet_id,
        });
        if let Some(provider) = &desired.provider {
            body["provider"] = json!(provider);
        }
        driver
            .capabilities
            .add_tags(LbResourceKind::LoadBalancer, &mut body, &driver.config.resource_tags);

        let response: api::LoadBalancer = driver.post(LbResourceKind::LoadBalancer, None, body).await?;

        let mut lb = desired.with_id(response.id.clone());
        lb.port_id = driver.vip_port_id(&lb, response.vip_port_id.as_deref()).await?;

        if let Some(requested) = &desired.provider {
            if response.provider.as_deref() != Some(requested.as_str()) {
                error!(
                    "Requested provider {} for {} but got {}",
                    requested,
                    desired.name,
                    response.provider.as_deref().unwrap_or("none")
                );
                return Err(DriverError::ResourceNotReady(format!("loadbalancer {}", desired.name)));
            }
        }
        lb.provider = response.provider;
        Ok(lb)
    }

    async fn find(&self, desired: &LoadBalancer) -> Result<Option<Found<LoadBalancer>>> {
        let driver = self.0;
        let key = desired.natural_key();
        let candidates = driver.lbaas.load_balancers(&key_filters(&key)).await?;

        let Some(response) = candidates
            .into_iter()
            .find(|lb| !lb.provisioning_status.is_deleting())
        else {
            return Ok(None);
        };

        let mut lb = desired.with_id(response.id.clone());
        lb.provider = response.provider.clone();
        if response.provisioning_status != ProvisioningStatus::Error {
            lb.port_id = driver.vip_port_id(&lb, response.vip_port_id.as_deref()).await?;
        }
        Ok(Some(Found {
            resource: lb,
            status: response.provisioning_status,
        }))
    }

    async fn delete(&self, lb: &LoadBalancer) -> Result<(), OpenStackError> {
        match lb.id.as_deref() {
            Some(id) => self.0.lbaas.delete_load_balancer(id, true).await,
            None => Ok(()),
        }
    }
}

impl LbaasDriver {
    /// Find or create the load balancer.
    ///
    /// One found in ERROR is released, its state cleared, and
    /// [`DriverError::Removed`] returned. A created one reporting a provider
    /// other than the requested one yields [`DriverError::ResourceNotReady`].
    pub async fn ensure_loadbalancer(&self, desired: &LoadBalancer) -> Result<LoadBalancer> {
        let ops = LoadBalancerOps(self);

        if let Some(Found { resource, status }) = ops.find(desired).await? {
            if status == ProvisioningStatus::Error {
                warn!("Cleaning up load balancer {} in ERROR", resource.name);
                match self.release_loadbalancer(&resource).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_ready() => debug!("Release of {} not finished: {}", resource.name, e),
                    Err(e) => return Err(e),
                }
                self.state.clear(&resource).await?;
                return Err(removed(&resource, status));
            }
            debug!("Found load balancer {} ({:?})", resource.name, resource.id);
            return Ok(resource);
        }

        let lb = ops.create(desired).await?;
        debug!("Created load balancer {} ({:?})", lb.name, lb.id);
        Ok(lb)
    }

    /// Cascade-delete the load balancer, wait until it is gone and drop the
    /// security group the engine created for it
    pub async fn release_loadbalancer(&self, lb: &LoadBalancer) -> Result<()> {
        self.release(&LoadBalancerOps(self), lb, lb).await?;
        self.monitor.wait_for_deletion(lb, self.config.activation_timeout).await?;

        if !self.config.enforce_sg_rules && self.config.sg_mode != SgMode::Create {
            return Ok(());
        }
        match find_lb_security_group(self.network.as_ref(), lb, None).await {
            Ok(Some(sg_id)) => match self.network.delete_security_group(&sg_id).await {
                Ok(()) => debug!("Deleted security group {} of {}", sg_id, lb.name),
                Err(e) if e.is_not_found() => {}
                Err(e) => error!("Failed to delete security group {} of {}, leaving it orphaned: {}", sg_id, lb.name, e),
            },
            Ok(None) => {}
            Err(e) => error!("Failed to look up security group of {}: {}", lb.name, e),
        }
        Ok(())
    }

    /// Load balancer by backend ID, `None` when it does not exist
    pub async fn get_lb_by_uuid(&self, id: &str) -> Result<Option<LoadBalancer>> {
        let response = match self.lbaas.get_load_balancer(id).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!("Load balancer {} not found", id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let ip = response
            .vip_address
            .as_deref()
            .and_then(|ip| ip.parse().ok())
            .ok_or_else(|| DriverError::Integrity(format!("load balancer {} has no valid VIP address", id)))?;
        Ok(Some(LoadBalancer {
            id: Some(response.id),
            name: response.name,
            project_id: response.project_id,
            subnet_id: response.vip_subnet_id.unwrap_or_default(),
            ip,
            security_groups: Vec::new(),
            provider: response.provider,
            port_id: response.vip_port_id,
        }))
    }
}
