//! Neutron (network v2.0) API models
//!
//! Only the security-group, port, subnet and subnet-pool shapes the driver reads.

use serde::{Deserialize, Serialize};

/// Security group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub security_group_rules: Vec<SecurityGroupRule>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Security group rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    pub direction: String,
    #[serde(default = "default_ethertype")]
    pub ethertype: String,
    pub protocol: Option<String>,
    pub port_range_min: Option<u16>,
    pub port_range_max: Option<u16>,
    pub remote_ip_prefix: Option<String>,
    pub remote_group_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub project_id: String,
}

impl SecurityGroupRule {
    /// Whether `port` falls inside this rule's port range.
    ///
    /// A rule without a range covers every port.
    pub fn covers_port(&self, port: u16) -> bool {
        match (self.port_range_min, self.port_range_max) {
            (Some(min), Some(max)) => (min..=max).contains(&port),
            (Some(min), None) => port == min,
            (None, _) => true,
        }
    }
}

/// Request body for creating a security group rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSecurityGroupRule {
    pub security_group_id: String,
    pub direction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethertype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateSecurityGroupRule {
    /// Ingress rule for a single port
    pub fn ingress(security_group_id: &str, protocol: &str, port: u16) -> Self {
        Self {
            security_group_id: security_group_id.to_string(),
            direction: "ingress".to_string(),
            protocol: Some(protocol.to_lowercase()),
            port_range_min: Some(port),
            port_range_max: Some(port),
            ..Default::default()
        }
    }
}

/// Request body for creating a security group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecurityGroup {
    pub name: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fixed IP of a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: String,
}

/// Port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub device_owner: String,
}

/// Subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub cidr: String,
    pub ip_version: u8,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub project_id: String,
    pub subnetpool_id: Option<String>,
}

/// Subnet pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

fn default_ethertype() -> String {
    "IPv4".to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
