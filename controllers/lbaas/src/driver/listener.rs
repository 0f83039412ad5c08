//! Listener ensure/release

use super::LbaasDriver;
use crate::backoff::SLOW_POLL_INTERVAL;
use crate::ensure::{Found, ResourceOps};
use crate::error::{DriverError, Result};
use crate::objects::{key_filters, listener_name, LbaasObject, Listener, LoadBalancer};
use crate::provisioning::removed;
use openstack_client::models as api;
use openstack_client::{LbResourceKind, OpenStackError, ProvisioningStatus, ResponseClass};
use serde_json::json;
use tracing::{debug, info, warn};

pub(crate) struct ListenerOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<Listener> for ListenerOps<'_> {
    async fn create(&self, desired: &Listener) -> Result<Listener> {
        let driver = self.0;
        let mut body = json!({
            "name": desired.name,
            "project_id": desired.project_id,
            "loadbalancer_id": desired.loadbalancer_id,
            "protocol": desired.protocol,
            "protocol_port": desired.port,
        });
        if let Some(timeout) = desired.timeout_client_data.filter(|t| *t > 0) {
            body["timeout_client_data"] = json!(timeout);
        }
        if let Some(timeout) = desired.timeout_member_data.filter(|t| *t > 0) {
            body["timeout_member_data"] = json!(timeout);
        }
        driver
            .capabilities
            .add_tags(LbResourceKind::Listener, &mut body, &driver.config.resource_tags);

        let response: api::Listener = driver.post(LbResourceKind::Listener, None, body).await?;
        Ok(from_response(desired, response))
    }

    async fn find(&self, desired: &Listener) -> Result<Option<Found<Listener>>> {
        let key = desired.natural_key();
        let found = self.0.lbaas.listeners(&key_filters(&key)).await?;

        Ok(found.into_iter().next().map(|response| {
            let status = response.provisioning_status;
            Found {
                resource: from_response(desired, response),
                status,
            }
        }))
    }

    async fn delete(&self, listener: &Listener) -> Result<(), OpenStackError> {
        match listener.id.as_deref() {
            Some(id) => self.0.lbaas.delete_listener(id).await,
            None => Ok(()),
        }
    }
}

fn from_response(desired: &Listener, response: api::Listener) -> Listener {
    Listener {
        timeout_client_data: response.timeout_client_data.or(desired.timeout_client_data),
        timeout_member_data: response.timeout_member_data.or(desired.timeout_member_data),
        ..desired.with_id(response.id)
    }
}

impl LbaasDriver {
    /// Ensure the listener for `protocol`/`port`, then its security rules.
    ///
    /// Returns `Ok(None)` when the backend rejects the listener (typically an
    /// unsupported protocol). A 404 means the load balancer is gone: its state
    /// is cleared and [`DriverError::Removed`] returned. Creating the
    /// engine-owned security group records it in `lb.security_groups`.
    pub async fn ensure_listener(
        &self,
        lb: &mut LoadBalancer,
        protocol: &str,
        port: u16,
        service_type: &str,
    ) -> Result<Option<Listener>> {
        let lb_id = lb
            .id
            .clone()
            .ok_or_else(|| DriverError::Integrity(format!("load balancer {} has no id", lb.name)))?;
        let desired = Listener {
            id: None,
            name: listener_name(&lb.name, protocol, port),
            project_id: lb.project_id.clone(),
            loadbalancer_id: lb_id,
            protocol: protocol.to_string(),
            port,
            timeout_client_data: self.config.timeout_client_data,
            timeout_member_data: self.config.timeout_member_data,
        };

        let listener = match self
            .ensure_provisioned(&ListenerOps(self), &desired, lb, SLOW_POLL_INTERVAL)
            .await
        {
            Ok(listener) => listener,
            Err(DriverError::Backend(e)) if e.class() == ResponseClass::NotFound => {
                warn!(
                    "Load balancer {:?} for {} doesn't exist, it has to be recreated",
                    lb.id, lb.name
                );
                self.state.clear(lb).await?;
                return Err(removed(lb, ProvisioningStatus::Deleted));
            }
            Err(DriverError::Backend(e)) if e.class() == ResponseClass::BadRequest => {
                info!(
                    "Listener {} creation failed, most probably because protocol {} is not supported: {}",
                    desired.name, protocol, e
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.ensure_security_group_rules(lb, &listener, service_type).await?;
        Ok(Some(listener))
    }

    /// Delete the listener and, without ACL support, the security group rule
    /// opened for it
    pub async fn release_listener(&self, lb: &LoadBalancer, listener: &Listener) -> Result<()> {
        self.release(&ListenerOps(self), lb, listener).await?;

        if self.capabilities.acls {
            return Ok(());
        }
        let Some(sg_id) = self.listener_security_group(lb).await? else {
            return Ok(());
        };

        let rules = self
            .network
            .list_security_group_rules(&[
                ("security_group_id", sg_id.as_str()),
                ("description", listener.name.as_str()),
            ])
            .await?;
        if rules.is_empty() {
            warn!(
                "Cannot find security group rule for listener {} ({:?})",
                listener.name, listener.id
            );
        }
        for rule in &rules {
            match self.network.delete_security_group_rule(&rule.id).await {
                Ok(()) => debug!("Deleted rule {} of listener {}", rule.id, listener.name),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
