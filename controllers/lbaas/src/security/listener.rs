//! Security rules opened when a listener is ensured

use super::{find_lb_security_group, listener_rule};
use crate::backoff::SLOW_POLL_INTERVAL;
use crate::config::SgMode;
use crate::driver::LbaasDriver;
use crate::error::{DriverError, Result};
use crate::objects::{Listener, LoadBalancer};
use openstack_client::{CreateSecurityGroup, CreateSecurityGroupRule};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

impl LbaasDriver {
    /// Open the load balancer to the service's sources on `listener`'s port.
    ///
    /// In create mode the engine-owned group gets a rule for the listener.
    /// With namespace isolation enforced on a ClusterIP service the namespace
    /// CIDRs behind `lb.security_groups` are granted as well, through the
    /// listener ACL when supported and through rules otherwise.
    pub async fn ensure_security_group_rules(
        &self,
        lb: &mut LoadBalancer,
        listener: &Listener,
        service_type: &str,
    ) -> Result<()> {
        if self.config.sg_mode == SgMode::Create {
            self.create_lb_security_group_rule(lb, listener).await?;
        }

        if !(self.config.namespace_isolation() && service_type == "ClusterIP" && self.config.enforce_sg_rules) {
            return Ok(());
        }
        if self.capabilities.acls {
            return self.ensure_listener_acls(lb, listener).await;
        }
        self.extend_lb_security_group_rules(lb, listener).await
    }

    /// Find or create the engine-owned group and attach it to the VIP port.
    ///
    /// The port gets either just this group or every group of `lb`.
    pub(crate) async fn ensure_lb_security_group(&self, lb: &mut LoadBalancer, attach_all: bool) -> Result<String> {
        if let Some(sg_id) = find_lb_security_group(self.network.as_ref(), lb, None).await? {
            return Ok(sg_id);
        }

        let group = self
            .network
            .create_security_group(&CreateSecurityGroup {
                name: lb.name.clone(),
                project_id: lb.project_id.clone(),
                description: None,
            })
            .await?;
        info!("Created security group {} for load balancer {}", group.id, lb.name);
        if !self.config.resource_tags.is_empty() {
            if let Err(e) = self
                .network
                .set_security_group_tags(&group.id, &self.config.resource_tags)
                .await
            {
                error!("Failed to tag security group {}: {}", group.id, e);
            }
        }
        lb.security_groups.push(group.id.clone());

        let attached = if attach_all {
            lb.security_groups.clone()
        } else {
            vec![group.id.clone()]
        };
        match self.vip_port(lb).await? {
            Some(port) => {
                self.network.update_port_security_groups(&port.id, &attached).await?;
            }
            None => warn!("No VIP port for {}, security group {} stays detached", lb.name, group.id),
        }
        Ok(group.id)
    }

    async fn create_lb_security_group_rule(&self, lb: &mut LoadBalancer, listener: &Listener) -> Result<()> {
        let sg_id = self.ensure_lb_security_group(lb, false).await?;
        let request = listener_rule(lb, &sg_id, &listener.protocol, listener.port, None, &listener.name);
        self.create_rule(request).await?;
        Ok(())
    }

    /// Grant the namespace CIDRs through the listener ACL
    async fn ensure_listener_acls(&self, lb: &LoadBalancer, listener: &Listener) -> Result<()> {
        let listener_id = listener
            .id
            .as_deref()
            .ok_or_else(|| DriverError::Integrity(format!("listener {} has no id", listener.name)))?;
        let vip_sg = self.vip_security_group(lb).await?;

        let mut allowed = BTreeSet::new();
        for sg in lb.security_groups.iter().filter(|sg| Some(*sg) != vip_sg.as_ref()) {
            allowed.extend(self.resolve_group_cidrs(lb, sg, &listener.name).await);
        }
        allowed.extend(self.platform_cidrs(lb).await?);

        self.update_listener_acls(lb, listener_id, Some(allowed.into_iter().collect()))
            .await
    }

    /// Grant the namespace CIDRs through rules on the load balancer group
    async fn extend_lb_security_group_rules(&self, lb: &mut LoadBalancer, listener: &Listener) -> Result<()> {
        let sg_id = match self.config.sg_mode {
            SgMode::Create => self.ensure_lb_security_group(lb, true).await?,
            SgMode::Update => {
                let Some(sg_id) = self.vip_security_group(lb).await? else {
                    warn!("VIP port of {} has no security group, can't restrict {}", lb.name, listener.name);
                    return Ok(());
                };
                self.remove_default_rules(&sg_id, listener).await?;
                sg_id
            }
        };

        for sg in lb.security_groups.iter().filter(|sg| **sg != sg_id) {
            let cidrs = self.resolve_group_cidrs(lb, sg, &listener.name).await;
            if cidrs.is_empty() {
                let request = CreateSecurityGroupRule {
                    remote_group_id: Some(sg.clone()),
                    ..listener_rule(lb, &sg_id, &listener.protocol, listener.port, None, &listener.name)
                };
                self.create_rule(request).await?;
                continue;
            }
            for cidr in cidrs {
                let request = listener_rule(lb, &sg_id, &listener.protocol, listener.port, Some(&cidr), &listener.name);
                self.create_rule(request).await?;
            }
        }

        match self.platform_cidrs(lb).await {
            Ok(cidrs) => {
                for cidr in cidrs {
                    let request =
                        listener_rule(lb, &sg_id, &listener.protocol, listener.port, Some(&cidr), &listener.name);
                    self.create_rule(request).await?;
                }
            }
            Err(e) => error!("Failed to resolve platform subnets of {}: {}", lb.name, e),
        }
        Ok(())
    }

    /// Delete the open rule the backend adds for a new listener.
    ///
    /// Polls until the rule shows up. Rules on the port without an open one
    /// mean it was already replaced.
    async fn remove_default_rules(&self, sg_id: &str, listener: &Listener) -> Result<()> {
        let protocol = super::sg_protocol(&listener.protocol);
        let port = listener.port.to_string();
        let mut timer = self.timer(SLOW_POLL_INTERVAL);

        while timer.tick().await.is_some() {
            let rules = self
                .network
                .list_security_group_rules(&[
                    ("security_group_id", sg_id),
                    ("protocol", protocol.as_str()),
                    ("port_range_min", port.as_str()),
                    ("port_range_max", port.as_str()),
                    ("direction", "ingress"),
                ])
                .await?;

            match rules
                .iter()
                .find(|r| r.remote_group_id.is_none() && r.remote_ip_prefix.is_none())
            {
                Some(rule) => {
                    debug!("Removing default rule {} of listener {}", rule.id, listener.name);
                    return self.delete_rule(rule).await;
                }
                None if !rules.is_empty() => return Ok(()),
                None => {}
            }
        }
        debug!("No default rule for listener {} showed up in {}", listener.name, sg_id);
        Ok(())
    }
}
