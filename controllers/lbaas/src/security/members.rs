//! Mirrors member security groups onto the load balancer

use super::{
    find_lb_security_group, is_default_rule, listener_rule, sg_protocol, ListenerRuleTarget, PolicyScan, TargetPort,
};
use crate::config::SgMode;
use crate::driver::LbaasDriver;
use crate::error::{DriverError, Result};
use crate::objects::{LbaasState, LoadBalancer};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use openstack_client::SecurityGroupRule;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

impl LbaasDriver {
    /// Mirror the ingress policy of the service's security groups onto one listener.
    ///
    /// `new_sgs` replaces `lb.security_groups` as the policy source; in create
    /// mode the engine-owned group is then looked up by the name prefix of
    /// `target.rule_name`. Nothing happens while the load balancer has no
    /// group to carry rules.
    pub async fn apply_members_security_groups(
        &self,
        lb: &LoadBalancer,
        target: &ListenerRuleTarget<'_>,
        new_sgs: Option<&[String]>,
    ) -> Result<()> {
        let lb_sg = match self.config.sg_mode {
            SgMode::Create => {
                let lb_name = new_sgs.map(|_| target.rule_name.split(':').next().unwrap_or(target.rule_name));
                find_lb_security_group(self.network.as_ref(), lb, lb_name).await?
            }
            SgMode::Update => self.vip_security_group(lb).await?,
        };
        let Some(lb_sg) = lb_sg else {
            debug!("Load balancer {} has no security group yet, skipping {}", lb.name, target.rule_name);
            return Ok(());
        };

        let groups = new_sgs.unwrap_or(lb.security_groups.as_slice());
        let scan = self.scan_policy_groups(groups, &lb_sg, target).await?;

        if self.capabilities.acls {
            let allowed = if scan.allow_all {
                None
            } else {
                Some(scan.cidrs.into_iter().collect())
            };
            return self.update_listener_acls(lb, target.listener_id, allowed).await;
        }
        self.reconcile_listener_rules(lb, &lb_sg, target, &scan).await
    }

    /// Record the service's security groups and re-apply them to every listener
    pub async fn update_lbaas_sg(&self, state: &mut LbaasState, service: &Service, sgs: Vec<String>) -> Result<()> {
        let namespace = service.metadata.namespace.as_deref().ok_or_else(|| {
            DriverError::Integrity("service without namespace".to_string())
        })?;
        let service_name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| DriverError::Integrity("service without name".to_string()))?;
        let expected = self.get_service_loadbalancer_name(namespace, service_name);

        let lb = state
            .loadbalancer
            .as_mut()
            .ok_or_else(|| DriverError::Integrity(format!("no load balancer recorded for {}", expected)))?;
        if lb.name != expected {
            return Err(DriverError::Integrity(format!(
                "load balancer {} does not belong to service {}",
                lb.name, expected
            )));
        }
        lb.security_groups = sgs.clone();
        let lb = lb.clone();
        self.state.save(state).await?;

        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .cloned()
            .unwrap_or_default();
        for port in ports {
            let protocol = port.protocol.clone().unwrap_or_else(|| "TCP".to_string());
            let Ok(listener_port) = u16::try_from(port.port) else {
                warn!("Service {} port {} is out of range, skipping", expected, port.port);
                continue;
            };
            let target_port = match port.target_port {
                None => TargetPort::Number(listener_port),
                Some(IntOrString::Int(p)) => TargetPort::Number(u16::try_from(p).unwrap_or(listener_port)),
                Some(IntOrString::String(name)) => match name.parse() {
                    Ok(p) => TargetPort::Number(p),
                    Err(_) => TargetPort::Named(name),
                },
            };

            let Some(listener) = state
                .listeners
                .iter()
                .find(|l| l.protocol == protocol && l.port == listener_port)
            else {
                warn!(
                    "No listener for {}:{} of {}, its security groups can't be applied",
                    protocol, listener_port, expected
                );
                continue;
            };
            let Some(listener_id) = listener.id.as_deref() else {
                continue;
            };

            let target = ListenerRuleTarget {
                listener_id,
                rule_name: &listener.name,
                protocol: &protocol,
                port: listener_port,
                target_port,
            };
            self.apply_members_security_groups(&lb, &target, Some(&sgs)).await?;
        }
        Ok(())
    }

    /// Allow-set granted by `groups` for the listener's target port
    pub(crate) async fn scan_policy_groups(
        &self,
        groups: &[String],
        lb_sg: &str,
        target: &ListenerRuleTarget<'_>,
    ) -> Result<PolicyScan> {
        let protocol = sg_protocol(target.protocol);
        let mut scan = PolicyScan::default();

        for sg in groups.iter().filter(|sg| sg.as_str() != lb_sg) {
            if self.config.pod_security_groups.contains(sg) {
                debug!("Security group {} disables isolation, allowing all", sg);
                scan.allow_all = true;
                break;
            }

            let rules = self
                .network
                .list_security_group_rules(&[("security_group_id", sg.as_str())])
                .await?;
            for rule in rules {
                if !grants_target(&rule, &protocol, &target.target_port) {
                    continue;
                }
                match rule.remote_ip_prefix {
                    Some(cidr) => {
                        scan.cidrs.insert(cidr);
                    }
                    None => scan.allow_all = true,
                }
            }
        }
        Ok(scan)
    }

    /// Diff the rules of `lb_sg` on the listener port against the allow-set
    async fn reconcile_listener_rules(
        &self,
        lb: &LoadBalancer,
        lb_sg: &str,
        target: &ListenerRuleTarget<'_>,
        scan: &PolicyScan,
    ) -> Result<()> {
        let protocol = sg_protocol(target.protocol);

        // None is the unrestricted rule
        let mut desired: BTreeSet<Option<String>> = scan.cidrs.iter().cloned().map(Some).collect();
        desired.extend(self.platform_cidrs(lb).await?.into_iter().map(Some));
        if scan.allow_all {
            desired.insert(None);
        }

        let existing = self
            .network
            .list_security_group_rules(&[("security_group_id", lb_sg)])
            .await?;
        let (on_port, others): (Vec<_>, Vec<_>) = existing
            .into_iter()
            .partition(|rule| is_listener_port_rule(rule, &protocol, target.port));

        for cidr in &desired {
            let present = on_port
                .iter()
                .any(|r| r.remote_group_id.is_none() && &r.remote_ip_prefix == cidr);
            if !present {
                let request = listener_rule(lb, lb_sg, target.protocol, target.port, cidr.as_deref(), target.rule_name);
                self.create_rule(request).await?;
            }
        }

        for rule in &on_port {
            let wanted = rule.remote_group_id.is_none() && desired.contains(&rule.remote_ip_prefix);
            if !wanted {
                info!(
                    "Removing rule {:?} for port {} of {}, no longer allowed",
                    rule.remote_ip_prefix, target.port, lb.name
                );
                self.delete_rule(rule).await?;
            }
        }

        if !scan.allow_all {
            for rule in others.iter().filter(|r| is_default_rule(r)) {
                debug!("Removing default rule {} from {}", rule.id, lb_sg);
                self.delete_rule(rule).await?;
            }
        }
        Ok(())
    }
}

/// Whether a member group rule grants ingress to the target port
fn grants_target(rule: &SecurityGroupRule, protocol: &str, target_port: &TargetPort) -> bool {
    if rule.remote_group_id.is_some() || rule.direction != "ingress" {
        return false;
    }
    if rule.protocol.as_deref() != Some(protocol) {
        return false;
    }
    rule.port_range_min.is_none() || target_port.admitted_by(rule)
}

/// Ingress rule of the load balancer group opening exactly the listener port
fn is_listener_port_rule(rule: &SecurityGroupRule, protocol: &str, port: u16) -> bool {
    rule.direction == "ingress" && rule.protocol.as_deref() == Some(protocol) && rule.port_range_min == Some(port)
}
