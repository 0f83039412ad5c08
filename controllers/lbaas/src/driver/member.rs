//! Member ensure/release
//!
//! Members are identified by (pool, subnet, address, port). Their name only
//! describes the target and is corrected in place when it went stale.

use super::LbaasDriver;
use crate::backoff::FAST_POLL_INTERVAL;
use crate::ensure::{Found, ResourceOps};
use crate::error::{DriverError, Result};
use crate::objects::{key_filters, member_name, LbaasObject, LoadBalancer, Member, MemberTarget, Pool};
use crate::provisioning::removed;
use crate::security::{ListenerRuleTarget, TargetPort};
use openstack_client::models as api;
use openstack_client::{LbResourceKind, OpenStackError, ProvisioningStatus};
use serde_json::json;
use tracing::{debug, warn};

pub(crate) struct MemberOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<Member> for MemberOps<'_> {
    async fn create(&self, desired: &Member) -> Result<Member> {
        let driver = self.0;
        let mut body = json!({
            "name": desired.name,
            "project_id": desired.project_id,
            "subnet_id": desired.subnet_id,
            "address": desired.ip.to_string(),
            "protocol_port": desired.port,
        });
        driver
            .capabilities
            .add_tags(LbResourceKind::Member, &mut body, &driver.config.resource_tags);

        let response: api::Member = driver
            .post(LbResourceKind::Member, Some(&desired.pool_id), body)
            .await?;
        Ok(desired.with_id(response.id))
    }

    async fn find(&self, desired: &Member) -> Result<Option<Found<Member>>> {
        let key = desired.natural_key();
        let found = self.0.lbaas.members(&desired.pool_id, &key_filters(&key)).await?;

        Ok(found.into_iter().next().map(|response| Found {
            resource: Member {
                name: response.name,
                ..desired.with_id(response.id)
            },
            status: response.provisioning_status,
        }))
    }

    async fn delete(&self, member: &Member) -> Result<(), OpenStackError> {
        match member.id.as_deref() {
            Some(id) => self.0.lbaas.delete_member(&member.pool_id, id).await,
            None => Ok(()),
        }
    }

    async fn update(&self, found: &mut Member, desired: &Member) -> Result<bool> {
        let Some(id) = found.id.as_deref() else {
            return Ok(false);
        };
        debug!("Renaming member {} from {} to {}", id, found.name, desired.name);
        let response = self.0.lbaas.update_member(&found.pool_id, id, &desired.name).await?;
        found.name = response.name;
        Ok(true)
    }
}

impl LbaasDriver {
    /// Ensure a member of `pool` for `target`.
    ///
    /// With network-policy isolation and a `listener_port`, the members'
    /// security groups are mirrored onto the load balancer afterwards. A 404
    /// means the pool or the load balancer is gone: the load balancer is
    /// released, its state cleared and [`DriverError::Removed`] returned.
    pub async fn ensure_member(
        &self,
        lb: &LoadBalancer,
        pool: &Pool,
        target: &MemberTarget,
        listener_port: Option<u16>,
    ) -> Result<Member> {
        let pool_id = pool
            .id
            .clone()
            .ok_or_else(|| DriverError::Integrity(format!("pool {} has no id", pool.name)))?;
        let desired = Member {
            id: None,
            name: member_name(&target.namespace, &target.name, target.port),
            project_id: lb.project_id.clone(),
            pool_id,
            subnet_id: target.subnet_id.clone(),
            ip: target.ip,
            port: target.port,
        };

        let member = match self
            .ensure_provisioned(&MemberOps(self), &desired, lb, FAST_POLL_INTERVAL)
            .await
        {
            Ok(member) => member,
            Err(DriverError::Backend(e)) if e.is_not_found() => {
                warn!(
                    "Load balancer {:?} or pool {:?} of {} doesn't exist, releasing it to recreate",
                    lb.id, pool.id, lb.name
                );
                self.release_loadbalancer(lb).await?;
                self.state.clear(lb).await?;
                return Err(removed(lb, ProvisioningStatus::Deleted));
            }
            Err(e) => return Err(e),
        };

        if let (true, Some(listener_port)) = (self.config.network_policy(), listener_port) {
            match pool.listener_id.as_deref() {
                Some(listener_id) => {
                    let rule_target = ListenerRuleTarget {
                        listener_id,
                        rule_name: &pool.name,
                        protocol: &pool.protocol,
                        port: listener_port,
                        target_port: TargetPort::Number(target.port),
                    };
                    self.apply_members_security_groups(lb, &rule_target, None).await?;
                }
                None => debug!("Pool {} has no listener, skipping member security groups", pool.name),
            }
        }
        Ok(member)
    }

    pub async fn release_member(&self, lb: &LoadBalancer, member: &Member) -> Result<()> {
        self.release(&MemberOps(self), lb, member).await
    }
}
