//! # Security Rule Reconciler
//!
//! Mirrors the isolation policy of a service's backends onto its load
//! balancer. Two mutually exclusive algorithms, picked by the ACL capability:
//!
//! - **Manual rules**: ingress rules on the load balancer's own security
//!   group, one per allowed CIDR and listener port, diffed against what exists.
//! - **Listener ACLs**: a declarative replace of the listener's allowed CIDRs.
//!
//! Either way the allow-set is computed from the ingress rules of the
//! service's security groups. A marker group meaning "isolation disabled", or a
//! rule without any remote restriction, turns the set into "allow all".

mod acl;
mod listener;
mod members;

#[cfg(test)]
mod acl_test;

use crate::config::SgMode;
use crate::driver::LbaasDriver;
use crate::error::Result;
use crate::objects::LoadBalancer;
use openstack_client::{CreateSecurityGroupRule, NetworkClientTrait, Port, SecurityGroupRule};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// Description the namespace isolation handler gives the rule holding a
/// namespace's CIDR
pub const NAMESPACE_RULE_DESCRIPTION: &str = "Kuryr Namespace SG rule";

/// Port the service forwards to, as declared on the Service port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    Number(u16),
    /// Named container port; never inside a numeric range
    Named(String),
}

impl TargetPort {
    /// Whether a port-ranged rule admits this target port
    pub fn admitted_by(&self, rule: &SecurityGroupRule) -> bool {
        match self {
            TargetPort::Number(port) => rule.covers_port(*port),
            TargetPort::Named(_) => false,
        }
    }
}

/// Listener whose rules or ACL are being reconciled
#[derive(Debug, Clone)]
pub struct ListenerRuleTarget<'a> {
    pub listener_id: &'a str,
    /// Description given to created rules; the listener name
    pub rule_name: &'a str,
    pub protocol: &'a str,
    pub port: u16,
    pub target_port: TargetPort,
}

/// Allow-set computed from a service's security groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PolicyScan {
    pub cidrs: BTreeSet<String>,
    pub allow_all: bool,
}

/// Security group the engine created for `lb`.
///
/// With `lb_name` the first group of that name in the project is taken;
/// otherwise the group named after the load balancer that is also attached to it.
pub(crate) async fn find_lb_security_group(
    network: &dyn NetworkClientTrait,
    lb: &LoadBalancer,
    lb_name: Option<&str>,
) -> Result<Option<String>> {
    let name = lb_name.unwrap_or(&lb.name);
    let groups = network
        .list_security_groups(&[("name", name), ("project_id", lb.project_id.as_str())])
        .await?;

    Ok(match lb_name {
        Some(_) => groups.into_iter().next().map(|g| g.id),
        None => groups
            .into_iter()
            .find(|g| lb.security_groups.contains(&g.id))
            .map(|g| g.id),
    })
}

/// Firewall protocol of a listener protocol
pub(crate) fn sg_protocol(protocol: &str) -> String {
    match protocol.to_uppercase().as_str() {
        "HTTP" | "HTTPS" | "TERMINATED_HTTPS" | "PROXY" => "tcp".to_string(),
        _ => protocol.to_lowercase(),
    }
}

/// Ether type of a rule for `cidr`, or of an unrestricted rule on `lb`'s VIP
pub(crate) fn ether_type(cidr: Option<&str>, lb: &LoadBalancer) -> &'static str {
    let v6 = match cidr {
        Some(cidr) => cidr.contains(':'),
        None => lb.ip.is_ipv6(),
    };
    if v6 {
        "IPv6"
    } else {
        "IPv4"
    }
}

/// Ingress rule without any remote restriction that the backend inserted
pub(crate) fn is_default_rule(rule: &SecurityGroupRule) -> bool {
    rule.direction == "ingress"
        && rule.remote_ip_prefix.is_none()
        && rule.remote_group_id.is_none()
        && rule.description.is_empty()
}

impl LbaasDriver {
    /// Port holding `lb`'s VIP
    pub(crate) async fn vip_port(&self, lb: &LoadBalancer) -> Result<Option<Port>> {
        if let Some(port_id) = lb.port_id.as_deref() {
            match self.network.get_port(port_id).await {
                Ok(port) => return Ok(Some(port)),
                Err(e) if e.is_not_found() => debug!("VIP port {} of {} not found by id", port_id, lb.name),
                Err(e) => return Err(e.into()),
            }
        }

        let subnet_filter = format!("subnet_id={}", lb.subnet_id);
        let ip_filter = format!("ip_address={}", lb.ip);
        let ports = self
            .network
            .list_ports(&[("fixed_ips", subnet_filter.as_str()), ("fixed_ips", ip_filter.as_str())])
            .await?;
        Ok(ports.into_iter().next())
    }

    /// ID of the VIP port, or `fallback` when no port holds the VIP
    pub(crate) async fn vip_port_id(&self, lb: &LoadBalancer, fallback: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .vip_port(lb)
            .await?
            .map(|port| port.id)
            .or_else(|| fallback.map(str::to_string)))
    }

    /// First security group of the VIP port
    pub(crate) async fn vip_security_group(&self, lb: &LoadBalancer) -> Result<Option<String>> {
        Ok(self
            .vip_port(lb)
            .await?
            .and_then(|port| port.security_groups.into_iter().next()))
    }

    /// Group holding the listener rules: the engine-owned one in create mode,
    /// the VIP port's group otherwise
    pub(crate) async fn listener_security_group(&self, lb: &LoadBalancer) -> Result<Option<String>> {
        match self.config.sg_mode {
            SgMode::Create => find_lb_security_group(self.network.as_ref(), lb, None).await,
            SgMode::Update => self.vip_security_group(lb).await,
        }
    }

    pub(crate) async fn subnet_cidr(&self, project_id: &str, subnet_id: &str) -> Result<String> {
        let key = (project_id.to_string(), subnet_id.to_string());
        let cidr = self
            .subnet_cidrs
            .get_or_try_insert_with(key, || async {
                self.network.get_subnet(subnet_id).await.map(|subnet| subnet.cidr)
            })
            .await?;
        Ok(cidr)
    }

    pub(crate) async fn subnet_pool_prefixes(&self, project_id: &str, pool_id: &str) -> Result<Vec<String>> {
        let key = (project_id.to_string(), pool_id.to_string());
        let prefixes = self
            .pool_prefixes
            .get_or_try_insert_with(key, || async {
                self.network.get_subnet_pool(pool_id).await.map(|pool| pool.prefixes)
            })
            .await?;
        Ok(prefixes)
    }

    /// CIDRs of the ingress rules of the allow-from-default marker group
    pub(crate) async fn global_namespace_cidrs(&self) -> Result<Vec<String>> {
        let Some(sg) = self.config.sg_allow_from_default.as_deref() else {
            return Ok(Vec::new());
        };
        let rules = self
            .network
            .list_security_group_rules(&[("security_group_id", sg), ("direction", "ingress")])
            .await?;
        Ok(rules.into_iter().filter_map(|r| r.remote_ip_prefix).collect())
    }

    /// CIDR of a namespace group, taken from its namespace rule
    pub(crate) async fn namespace_cidr(&self, sg: &str) -> Result<Option<String>> {
        let rules = self
            .network
            .list_security_group_rules(&[
                ("security_group_id", sg),
                ("direction", "ingress"),
                ("description", NAMESPACE_RULE_DESCRIPTION),
            ])
            .await?;
        if rules.len() > 1 {
            warn!(
                "Security group {} has {} namespace rules, isolation may be broken by manual edits",
                sg,
                rules.len()
            );
        }
        Ok(rules.into_iter().next().and_then(|r| r.remote_ip_prefix))
    }

    /// CIDRs a namespace isolation group stands for. Lookup failures are
    /// logged and yield nothing.
    pub(crate) async fn resolve_group_cidrs(&self, lb: &LoadBalancer, sg: &str, listener_name: &str) -> Vec<String> {
        let resolved = if self.config.sg_allow_from_default.as_deref() == Some(sg) {
            match self.config.pod_subnet_pool.as_deref() {
                Some(pool_id) => self.subnet_pool_prefixes(&lb.project_id, pool_id).await,
                None => Ok(Vec::new()),
            }
        } else if self.config.sg_allow_from_namespaces.as_deref() == Some(sg) {
            self.global_namespace_cidrs().await
        } else {
            self.namespace_cidr(sg).await.map(|cidr| cidr.into_iter().collect())
        };

        resolved.unwrap_or_else(|e| {
            error!(
                "Failed to resolve CIDRs of security group {} for listener {}: {}",
                sg, listener_name, e
            );
            Vec::new()
        })
    }

    /// VIP subnet and worker subnet, always granted ingress
    pub(crate) async fn platform_cidrs(&self, lb: &LoadBalancer) -> Result<Vec<String>> {
        let mut cidrs = vec![self.subnet_cidr(&lb.project_id, &lb.subnet_id).await?];
        if let Some(worker_subnet) = self.config.worker_nodes_subnet.as_deref() {
            cidrs.push(self.subnet_cidr(&lb.project_id, worker_subnet).await?);
        }
        Ok(cidrs)
    }

    /// Create a rule, treating a conflict as already applied
    pub(crate) async fn create_rule(&self, request: CreateSecurityGroupRule) -> Result<()> {
        match self.network.create_security_group_rule(&request).await {
            Ok(rule) => {
                debug!(
                    "Created rule {} in {} for {:?}",
                    rule.id, request.security_group_id, request.remote_ip_prefix
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    "Rule for {:?} already in {}",
                    request.remote_ip_prefix, request.security_group_id
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to create rule {:?} in {}: {}",
                    request.description, request.security_group_id, e
                );
                Err(e.into())
            }
        }
    }

    /// Delete a rule, treating "not found" as done
    pub(crate) async fn delete_rule(&self, rule: &SecurityGroupRule) -> Result<()> {
        match self.network.delete_security_group_rule(&rule.id).await {
            Ok(()) => {
                debug!(
                    "Deleted rule {} ({:?}) from {}",
                    rule.id, rule.remote_ip_prefix, rule.security_group_id
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ingress rule on `port` for a listener, optionally restricted to `cidr`
pub(crate) fn listener_rule(
    lb: &LoadBalancer,
    security_group_id: &str,
    protocol: &str,
    port: u16,
    cidr: Option<&str>,
    description: &str,
) -> CreateSecurityGroupRule {
    CreateSecurityGroupRule {
        ethertype: Some(ether_type(cidr, lb).to_string()),
        remote_ip_prefix: cidr.map(str::to_string),
        description: Some(description.to_string()),
        ..CreateSecurityGroupRule::ingress(security_group_id, &sg_protocol(protocol), port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min: Option<u16>, max: Option<u16>) -> SecurityGroupRule {
        SecurityGroupRule {
            id: "r".to_string(),
            security_group_id: "sg".to_string(),
            direction: "ingress".to_string(),
            ethertype: "IPv4".to_string(),
            protocol: Some("tcp".to_string()),
            port_range_min: min,
            port_range_max: max,
            remote_ip_prefix: None,
            remote_group_id: None,
            description: String::new(),
            project_id: String::new(),
        }
    }

    #[test]
    fn test_target_port_ranges() {
        let ranged = rule(Some(8000), Some(8100));
        assert!(TargetPort::Number(8080).admitted_by(&ranged));
        assert!(!TargetPort::Number(80).admitted_by(&ranged));
        assert!(!TargetPort::Named("http".to_string()).admitted_by(&ranged));
    }

    #[test]
    fn test_sg_protocol() {
        assert_eq!(sg_protocol("TCP"), "tcp");
        assert_eq!(sg_protocol("UDP"), "udp");
        assert_eq!(sg_protocol("HTTP"), "tcp");
        assert_eq!(sg_protocol("SCTP"), "sctp");
    }

    #[test]
    fn test_ether_type_follows_cidr_or_vip() {
        let v4 = LoadBalancer::new("lb", "p", "s", "10.0.0.1".parse().unwrap(), vec![]);
        let v6 = LoadBalancer::new("lb", "p", "s", "fd00::1".parse().unwrap(), vec![]);
        assert_eq!(ether_type(Some("10.0.0.0/24"), &v6), "IPv4");
        assert_eq!(ether_type(Some("fd00::/64"), &v4), "IPv6");
        assert_eq!(ether_type(None, &v4), "IPv4");
        assert_eq!(ether_type(None, &v6), "IPv6");
    }

    #[test]
    fn test_default_rule_detection() {
        let mut r = rule(Some(80), Some(80));
        assert!(is_default_rule(&r));
        r.description = "default/web:TCP:80".to_string();
        assert!(!is_default_rule(&r));
        let mut r = rule(None, None);
        r.remote_ip_prefix = Some("10.0.0.0/24".to_string());
        assert!(!is_default_rule(&r));
    }
}
