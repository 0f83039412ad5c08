//! L7 policy and rule ensure/release

use super::LbaasDriver;
use crate::backoff::FAST_POLL_INTERVAL;
use crate::ensure::{Found, ResourceOps};
use crate::error::{DriverError, Result};
use crate::objects::{key_filters, l7_policy_name, L7Policy, L7Rule, LbaasObject, LoadBalancer, Pool};
use openstack_client::models as api;
use openstack_client::{LbResourceKind, OpenStackError};
use serde_json::json;
use tracing::error;

const REDIRECT_TO_POOL: &str = "REDIRECT_TO_POOL";

pub(crate) struct L7PolicyOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<L7Policy> for L7PolicyOps<'_> {
    async fn create(&self, desired: &L7Policy) -> Result<L7Policy> {
        let driver = self.0;
        let mut body = json!({
            "action": REDIRECT_TO_POOL,
            "listener_id": desired.listener_id,
            "name": desired.name,
            "project_id": desired.project_id,
            "redirect_pool_id": desired.redirect_pool_id,
        });
        driver
            .capabilities
            .add_tags(LbResourceKind::L7Policy, &mut body, &driver.config.resource_tags);

        let response: api::L7Policy = driver.post(LbResourceKind::L7Policy, None, body).await?;
        Ok(desired.with_id(response.id))
    }

    async fn find(&self, desired: &L7Policy) -> Result<Option<Found<L7Policy>>> {
        let key = desired.natural_key();
        let found = self.0.lbaas.l7_policies(&key_filters(&key)).await?;

        Ok(found.into_iter().next().map(|response| Found {
            resource: desired.with_id(response.id),
            status: response.provisioning_status,
        }))
    }

    async fn delete(&self, policy: &L7Policy) -> Result<(), OpenStackError> {
        match policy.id.as_deref() {
            Some(id) => self.0.lbaas.delete_l7_policy(id).await,
            None => Ok(()),
        }
    }
}

pub(crate) struct L7RuleOps<'a>(pub &'a LbaasDriver);

#[async_trait::async_trait]
impl ResourceOps<L7Rule> for L7RuleOps<'_> {
    async fn create(&self, desired: &L7Rule) -> Result<L7Rule> {
        let driver = self.0;
        let mut body = json!({
            "compare_type": desired.compare_type,
            "type": desired.rule_type,
            "value": desired.value,
        });
        driver
            .capabilities
            .add_tags(LbResourceKind::L7Rule, &mut body, &driver.config.resource_tags);

        let response: api::L7Rule = driver
            .post(LbResourceKind::L7Rule, Some(&desired.l7policy_id), body)
            .await?;
        Ok(desired.with_id(response.id))
    }

    async fn find(&self, desired: &L7Rule) -> Result<Option<Found<L7Rule>>> {
        let key = desired.natural_key();
        let found = self.0.lbaas.l7_rules(&desired.l7policy_id, &key_filters(&key)).await?;

        Ok(found.into_iter().next().map(|response| Found {
            resource: desired.with_id(response.id),
            status: response.provisioning_status,
        }))
    }

    async fn delete(&self, rule: &L7Rule) -> Result<(), OpenStackError> {
        match rule.id.as_deref() {
            Some(id) => self.0.lbaas.delete_l7_rule(&rule.l7policy_id, id).await,
            None => Ok(()),
        }
    }
}

impl LbaasDriver {
    /// Ensure a policy on `listener_id` redirecting to `pool`
    pub async fn ensure_l7_policy(
        &self,
        namespace: &str,
        route_name: &str,
        lb: &LoadBalancer,
        pool: &Pool,
        listener_id: &str,
    ) -> Result<L7Policy> {
        let redirect_pool_id = pool
            .id
            .clone()
            .ok_or_else(|| DriverError::Integrity(format!("pool {} has no id", pool.name)))?;
        let desired = L7Policy {
            id: None,
            name: l7_policy_name(namespace, route_name),
            project_id: pool.project_id.clone(),
            listener_id: listener_id.to_string(),
            redirect_pool_id,
        };
        self.ensure_provisioned(&L7PolicyOps(self), &desired, lb, FAST_POLL_INTERVAL)
            .await
    }

    pub async fn release_l7_policy(&self, lb: &LoadBalancer, policy: &L7Policy) -> Result<()> {
        self.release(&L7PolicyOps(self), lb, policy).await
    }

    pub async fn ensure_l7_rule(
        &self,
        lb: &LoadBalancer,
        policy: &L7Policy,
        compare_type: &str,
        rule_type: &str,
        value: &str,
    ) -> Result<L7Rule> {
        let l7policy_id = policy
            .id
            .clone()
            .ok_or_else(|| DriverError::Integrity(format!("l7 policy {} has no id", policy.name)))?;
        let desired = L7Rule {
            id: None,
            l7policy_id,
            compare_type: compare_type.to_string(),
            rule_type: rule_type.to_string(),
            value: value.to_string(),
        };
        self.ensure_provisioned(&L7RuleOps(self), &desired, lb, FAST_POLL_INTERVAL)
            .await
    }

    pub async fn release_l7_rule(&self, lb: &LoadBalancer, rule: &L7Rule) -> Result<()> {
        self.release(&L7RuleOps(self), lb, rule).await
    }

    /// Change the value a rule matches on
    pub async fn update_l7_rule(&self, rule: &L7Rule, new_value: &str) -> Result<()> {
        let id = rule
            .id
            .as_deref()
            .ok_or_else(|| DriverError::Integrity(format!("l7 rule {} has no id", rule.value)))?;
        self.lbaas
            .update_l7_rule(&rule.l7policy_id, id, new_value)
            .await
            .map_err(|e| {
                error!("Failed to update l7 rule {}: {}", id, e);
                DriverError::from(e)
            })?;
        Ok(())
    }

    /// Whether a policy other than `policy` redirects to `pool`
    pub async fn is_pool_used_by_other_l7policies(&self, policy: &L7Policy, pool: &Pool) -> Result<bool> {
        let Some(pool_id) = pool.id.as_deref() else {
            return Ok(false);
        };
        let policies = self
            .lbaas
            .l7_policies(&[("project_id", policy.project_id.as_str())])
            .await?;
        Ok(policies
            .iter()
            .any(|p| p.redirect_pool_id.as_deref() == Some(pool_id) && Some(p.id.as_str()) != policy.id.as_deref()))
    }
}
