//! Octavia (load-balancer v2) API models
//!
//! These models match the Octavia v2 REST API response bodies.
//! See: octavia/api/v2/types/

use serde::{Deserialize, Serialize};

/// Provisioning status reported by Octavia for every resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    Active,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Deleted,
    Error,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl ProvisioningStatus {
    /// Status string as Octavia spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Active => "ACTIVE",
            ProvisioningStatus::PendingCreate => "PENDING_CREATE",
            ProvisioningStatus::PendingUpdate => "PENDING_UPDATE",
            ProvisioningStatus::PendingDelete => "PENDING_DELETE",
            ProvisioningStatus::Deleted => "DELETED",
            ProvisioningStatus::Error => "ERROR",
            ProvisioningStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether the resource is being (or has been) deleted
    pub fn is_deleting(&self) -> bool {
        matches!(self, ProvisioningStatus::PendingDelete | ProvisioningStatus::Deleted)
    }
}

impl std::fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to another resource by ID (e.g. `listeners: [{"id": ...}]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Load balancer model matching the Octavia LoadBalancerResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    pub vip_address: Option<String>,
    pub vip_subnet_id: Option<String>,
    pub vip_port_id: Option<String>,
    pub provider: Option<String>,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: Option<String>,
    #[serde(default)]
    pub listeners: Vec<IdRef>,
    #[serde(default)]
    pub pools: Vec<IdRef>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Listener model matching the Octavia ListenerResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    pub protocol_port: u16,
    #[serde(default)]
    pub loadbalancers: Vec<IdRef>,
    pub default_pool_id: Option<String>,
    pub provisioning_status: ProvisioningStatus,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    pub allowed_cidrs: Option<Vec<String>>,
    pub timeout_client_data: Option<u32>,
    pub timeout_member_data: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Pool model matching the Octavia PoolResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    pub lb_algorithm: String,
    #[serde(default)]
    pub listeners: Vec<IdRef>,
    #[serde(default)]
    pub loadbalancers: Vec<IdRef>,
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Member model matching the Octavia MemberResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    pub address: String,
    pub protocol_port: u16,
    pub subnet_id: Option<String>,
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// L7 policy model matching the Octavia L7PolicyResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L7Policy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    pub listener_id: String,
    pub action: String,
    pub redirect_pool_id: Option<String>,
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// L7 rule model matching the Octavia L7RuleResponse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L7Rule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub compare_type: String,
    pub value: String,
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Kinds of Octavia resources and where they live in the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LbResourceKind {
    LoadBalancer,
    Listener,
    Pool,
    Member,
    L7Policy,
    L7Rule,
}

impl LbResourceKind {
    /// JSON key of a single resource (`{"listener": {...}}`)
    pub fn resource_key(&self) -> &'static str {
        match self {
            LbResourceKind::LoadBalancer => "loadbalancer",
            LbResourceKind::Listener => "listener",
            LbResourceKind::Pool => "pool",
            LbResourceKind::Member => "member",
            LbResourceKind::L7Policy => "l7policy",
            LbResourceKind::L7Rule => "rule",
        }
    }

    /// JSON key of a resource collection (`{"listeners": [...]}`)
    pub fn resources_key(&self) -> &'static str {
        match self {
            LbResourceKind::LoadBalancer => "loadbalancers",
            LbResourceKind::Listener => "listeners",
            LbResourceKind::Pool => "pools",
            LbResourceKind::Member => "members",
            LbResourceKind::L7Policy => "l7policies",
            LbResourceKind::L7Rule => "rules",
        }
    }

    /// Collection path. Members and L7 rules are nested under their parent,
    /// whose ID must be given as `parent_id`.
    pub fn base_path(&self, parent_id: Option<&str>) -> String {
        match self {
            LbResourceKind::LoadBalancer => "/v2/lbaas/loadbalancers".to_string(),
            LbResourceKind::Listener => "/v2/lbaas/listeners".to_string(),
            LbResourceKind::Pool => "/v2/lbaas/pools".to_string(),
            LbResourceKind::Member => {
                format!("/v2/lbaas/pools/{}/members", parent_id.unwrap_or_default())
            }
            LbResourceKind::L7Policy => "/v2/lbaas/l7policies".to_string(),
            LbResourceKind::L7Rule => {
                format!("/v2/lbaas/l7policies/{}/rules", parent_id.unwrap_or_default())
            }
        }
    }
}

impl std::fmt::Display for LbResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_status_unknown_value() {
        let s: ProvisioningStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(s, ProvisioningStatus::Unknown);
        let s: ProvisioningStatus = serde_json::from_str("\"PENDING_UPDATE\"").unwrap();
        assert_eq!(s, ProvisioningStatus::PendingUpdate);
        assert_eq!(s.to_string(), "PENDING_UPDATE");
    }

    #[test]
    fn test_nested_base_paths() {
        assert_eq!(LbResourceKind::Member.base_path(Some("p1")), "/v2/lbaas/pools/p1/members");
        assert_eq!(LbResourceKind::L7Rule.base_path(Some("x")), "/v2/lbaas/l7policies/x/rules");
        assert_eq!(LbResourceKind::Listener.base_path(None), "/v2/lbaas/listeners");
    }

    #[test]
    fn test_listener_defaults_admin_state_up() {
        let l: Listener = serde_json::from_value(serde_json::json!({
            "id": "l1",
            "protocol": "TCP",
            "protocol_port": 80,
            "provisioning_status": "ACTIVE"
        }))
        .unwrap();
        assert!(l.admin_state_up);
        assert!(l.allowed_cidrs.is_none());
    }
}
