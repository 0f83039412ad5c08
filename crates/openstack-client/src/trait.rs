//! Client traits for mocking
//!
//! These traits abstract the Octavia and Neutron clients to enable mocking in unit tests.
//! The concrete clients implement them, and tests can use the in-memory mocks.

use crate::error::OpenStackError;
use crate::models::*;

/// Trait for Octavia (load-balancer v2) API operations
///
/// List calls take `(key, value)` filters that are passed through as query parameters.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait LoadBalancerClientTrait: Send + Sync {
    /// Version documents of the load-balancer service, by region then service type
    async fn get_all_version_data(&self) -> Result<VersionMap, OpenStackError>;

    /// Create a resource from a raw request body.
    ///
    /// The body is wrapped in `{"<resource_key>": body}` and the unwrapped
    /// created resource is returned. `parent_id` is the pool (members) or
    /// L7 policy (rules) the resource is nested under.
    async fn post_resource(
        &self,
        kind: LbResourceKind,
        parent_id: Option<&str>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, OpenStackError>;

    // Load balancers
    async fn load_balancers(&self, filters: &[(&str, &str)]) -> Result<Vec<LoadBalancer>, OpenStackError>;
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer, OpenStackError>;
    async fn delete_load_balancer(&self, id: &str, cascade: bool) -> Result<(), OpenStackError>;

    // Listeners
    async fn listeners(&self, filters: &[(&str, &str)]) -> Result<Vec<Listener>, OpenStackError>;
    /// Partial update; `body` holds only the fields to change
    async fn update_listener(&self, id: &str, body: serde_json::Value) -> Result<Listener, OpenStackError>;
    async fn delete_listener(&self, id: &str) -> Result<(), OpenStackError>;

    // Pools
    async fn pools(&self, filters: &[(&str, &str)]) -> Result<Vec<Pool>, OpenStackError>;
    async fn delete_pool(&self, id: &str) -> Result<(), OpenStackError>;

    // Members
    async fn members(&self, pool_id: &str, filters: &[(&str, &str)]) -> Result<Vec<Member>, OpenStackError>;
    async fn update_member(&self, pool_id: &str, id: &str, name: &str) -> Result<Member, OpenStackError>;
    async fn delete_member(&self, pool_id: &str, id: &str) -> Result<(), OpenStackError>;

    // L7 policies and rules
    async fn l7_policies(&self, filters: &[(&str, &str)]) -> Result<Vec<L7Policy>, OpenStackError>;
    async fn delete_l7_policy(&self, id: &str) -> Result<(), OpenStackError>;
    async fn l7_rules(&self, l7policy_id: &str, filters: &[(&str, &str)]) -> Result<Vec<L7Rule>, OpenStackError>;
    async fn update_l7_rule(&self, l7policy_id: &str, id: &str, value: &str) -> Result<L7Rule, OpenStackError>;
    async fn delete_l7_rule(&self, l7policy_id: &str, id: &str) -> Result<(), OpenStackError>;
}

/// Trait for the Neutron (network v2.0) operations the driver needs
#[async_trait::async_trait]
pub trait NetworkClientTrait: Send + Sync {
    // Security groups
    async fn list_security_groups(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroup>, OpenStackError>;
    async fn create_security_group(&self, request: &CreateSecurityGroup) -> Result<SecurityGroup, OpenStackError>;
    async fn delete_security_group(&self, id: &str) -> Result<(), OpenStackError>;
    async fn set_security_group_tags(&self, id: &str, tags: &[String]) -> Result<(), OpenStackError>;

    // Security group rules
    async fn list_security_group_rules(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroupRule>, OpenStackError>;
    async fn create_security_group_rule(&self, request: &CreateSecurityGroupRule) -> Result<SecurityGroupRule, OpenStackError>;
    async fn delete_security_group_rule(&self, id: &str) -> Result<(), OpenStackError>;

    // Ports
    /// `fixed_ips` filters are given as `("fixed_ips", "subnet_id=<id>")` / `("fixed_ips", "ip_address=<ip>")`
    async fn list_ports(&self, filters: &[(&str, &str)]) -> Result<Vec<Port>, OpenStackError>;
    async fn get_port(&self, id: &str) -> Result<Port, OpenStackError>;
    async fn update_port_security_groups(&self, id: &str, security_groups: &[String]) -> Result<Port, OpenStackError>;

    // Subnets
    async fn get_subnet(&self, id: &str) -> Result<Subnet, OpenStackError>;
    async fn get_subnet_pool(&self, id: &str) -> Result<SubnetPool, OpenStackError>;
}
