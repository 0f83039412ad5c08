//! Value objects passed between the driver and its caller.
//!
//! One record type per resource kind. `id` stays `None` until the backend
//! confirmed a create or an existing match was found.

use openstack_client::LbResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::net::IpAddr;

/// Common surface of every reconciled resource
pub trait LbaasObject: Clone + Debug + Send + Sync {
    /// Backend resource kind
    const KIND: LbResourceKind;

    /// Backend ID, once known
    fn id(&self) -> Option<&str>;

    /// Record the backend ID
    fn set_id(&mut self, id: String);

    /// Descriptive name
    fn name(&self) -> &str;

    /// Backend list filters that identify the resource
    fn natural_key(&self) -> NaturalKey;

    /// Copy of `self` carrying the backend ID
    fn with_id(&self, id: String) -> Self {
        let mut resource = self.clone();
        resource.set_id(id);
        resource
    }
}

/// `(filter, value)` pairs a resource is looked up by
pub type NaturalKey = Vec<(&'static str, String)>;

/// Borrowed form of a [`NaturalKey`], as the client list calls take it
pub fn key_filters(key: &NaturalKey) -> Vec<(&str, &str)> {
    key.iter().map(|(field, value)| (*field, value.as_str())).collect()
}

/// Load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: Option<String>,
    pub name: String,
    pub project_id: String,
    pub subnet_id: String,
    pub ip: IpAddr,
    #[serde(default)]
    pub security_groups: Vec<String>,
    pub provider: Option<String>,
    pub port_id: Option<String>,
}

impl LoadBalancer {
    /// Desired load balancer, not yet known to the backend
    pub fn new(name: &str, project_id: &str, subnet_id: &str, ip: IpAddr, security_groups: Vec<String>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            project_id: project_id.to_string(),
            subnet_id: subnet_id.to_string(),
            ip,
            security_groups,
            provider: None,
            port_id: None,
        }
    }

    /// Ask for a specific backend provider
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }
}

impl LbaasObject for LoadBalancer {
    const KIND: LbResourceKind = LbResourceKind::LoadBalancer;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn natural_key(&self) -> NaturalKey {
        vec![
            ("name", self.name.clone()),
            ("project_id", self.project_id.clone()),
            ("vip_address", self.ip.to_string()),
            ("vip_subnet_id", self.subnet_id.clone()),
        ]
    }
}

/// Listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub id: Option<String>,
    pub name: String,
    pub project_id: String,
    pub loadbalancer_id: String,
    pub protocol: String,
    pub port: u16,
    pub timeout_client_data: Option<u32>,
    pub timeout_member_data: Option<u32>,
}

impl LbaasObject for Listener {
    const KIND: LbResourceKind = LbResourceKind::Listener;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn natural_key(&self) -> NaturalKey {
        vec![
            ("name", self.name.clone()),
            ("project_id", self.project_id.clone()),
            ("loadbalancer_id", self.loadbalancer_id.clone()),
            ("protocol", self.protocol.clone()),
            ("protocol_port", self.port.to_string()),
        ]
    }
}

/// Pool, either behind a listener or attached directly to the load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: Option<String>,
    pub name: String,
    pub project_id: String,
    pub loadbalancer_id: String,
    pub listener_id: Option<String>,
    pub protocol: String,
}

impl LbaasObject for Pool {
    const KIND: LbResourceKind = LbResourceKind::Pool;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn natural_key(&self) -> NaturalKey {
        // the listener link is matched after listing
        vec![
            ("name", self.name.clone()),
            ("project_id", self.project_id.clone()),
            ("loadbalancer_id", self.loadbalancer_id.clone()),
            ("protocol", self.protocol.clone()),
        ]
    }
}

/// Pool member. The name is descriptive only and is corrected in place when stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<String>,
    pub name: String,
    pub project_id: String,
    pub pool_id: String,
    pub subnet_id: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl LbaasObject for Member {
    const KIND: LbResourceKind = LbResourceKind::Member;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn natural_key(&self) -> NaturalKey {
        // scoped to `pool_id` by the list call itself
        vec![
            ("project_id", self.project_id.clone()),
            ("subnet_id", self.subnet_id.clone()),
            ("address", self.ip.to_string()),
            ("protocol_port", self.port.to_string()),
        ]
    }
}

/// Where a member sends traffic and who it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTarget {
    pub subnet_id: String,
    pub ip: IpAddr,
    pub port: u16,
    /// Namespace of the target (pod) object
    pub namespace: String,
    /// Name of the target (pod) object
    pub name: String,
}

/// L7 policy; the action is always a redirect to `redirect_pool_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L7Policy {
    pub id: Option<String>,
    pub name: String,
    pub project_id: String,
    pub listener_id: String,
    pub redirect_pool_id: String,
}

impl LbaasObject for L7Policy {
    const KIND: LbResourceKind = LbResourceKind::L7Policy;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn natural_key(&self) -> NaturalKey {
        vec![
            ("name", self.name.clone()),
            ("project_id", self.project_id.clone()),
            ("redirect_pool_id", self.redirect_pool_id.clone()),
            ("listener_id", self.listener_id.clone()),
        ]
    }
}

/// L7 rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L7Rule {
    pub id: Option<String>,
    pub l7policy_id: String,
    pub compare_type: String,
    pub rule_type: String,
    pub value: String,
}

impl LbaasObject for L7Rule {
    const KIND: LbResourceKind = LbResourceKind::L7Rule;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    // rules carry no name of their own
    fn name(&self) -> &str {
        &self.value
    }

    fn natural_key(&self) -> NaturalKey {
        vec![
            ("type", self.rule_type.clone()),
            ("value", self.value.clone()),
            ("compare_type", self.compare_type.clone()),
        ]
    }
}

/// Persisted reconciliation state of one service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbaasState {
    pub loadbalancer: Option<LoadBalancer>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Load balancer name of a service: `"<namespace>/<service>"`
pub fn loadbalancer_name(namespace: &str, service: &str) -> String {
    format!("{}/{}", namespace, service)
}

/// Listener name: `"<lb name>:<PROTOCOL>:<port>"`. Pools behind a listener share it.
pub fn listener_name(loadbalancer_name: &str, protocol: &str, port: u16) -> String {
    format!("{}:{}:{}", loadbalancer_name, protocol, port)
}

/// Name of a pool attached directly to a load balancer: `"<lb name>/<namespace>/<service>"`
pub fn loadbalancer_pool_name(loadbalancer_name: &str, namespace: &str, service: &str) -> String {
    format!("{}/{}/{}", loadbalancer_name, namespace, service)
}

/// Member name: `"<namespace>/<target>:<port>"`
pub fn member_name(namespace: &str, target: &str, port: u16) -> String {
    format!("{}/{}:{}", namespace, target, port)
}

/// L7 policy name: namespace followed by route name
pub fn l7_policy_name(namespace: &str, route: &str) -> String {
    format!("{}{}", namespace, route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming() {
        let lb = loadbalancer_name("default", "web");
        assert_eq!(lb, "default/web");
        assert_eq!(listener_name(&lb, "TCP", 80), "default/web:TCP:80");
        assert_eq!(loadbalancer_pool_name(&lb, "ns", "svc"), "default/web/ns/svc");
        assert_eq!(member_name("default", "web-0", 8080), "default/web-0:8080");
        assert_eq!(l7_policy_name("ns", "route"), "nsroute");
    }

    #[test]
    fn test_state_round_trips_without_ids() {
        let state = LbaasState {
            loadbalancer: Some(LoadBalancer::new(
                "default/web",
                "proj",
                "subnet",
                "10.0.0.10".parse().unwrap(),
                vec!["sg".to_string()],
            )),
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: LbaasState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(back.loadbalancer.unwrap().id.is_none());
    }

    #[test]
    fn test_natural_key_and_with_id() {
        let member = Member {
            id: None,
            name: "default/web-0:8080".to_string(),
            project_id: "proj".to_string(),
            pool_id: "pool-1".to_string(),
            subnet_id: "subnet".to_string(),
            ip: "10.0.0.7".parse().unwrap(),
            port: 8080,
        };
        let key = member.natural_key();
        assert_eq!(
            key_filters(&key),
            vec![
                ("project_id", "proj"),
                ("subnet_id", "subnet"),
                ("address", "10.0.0.7"),
                ("protocol_port", "8080"),
            ]
        );

        let found = member.with_id("member-1".to_string());
        assert_eq!(found.id(), Some("member-1"));
        assert_eq!(found.natural_key(), key);
        assert!(member.id.is_none());
    }
}
