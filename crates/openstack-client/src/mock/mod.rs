//! Mock OpenStack clients for unit testing
//!
//! In-memory implementations of [`LoadBalancerClientTrait`] and
//! [`NetworkClientTrait`] for tests that must not reach a real cloud.
//!
//! The mocks are organized into domain-specific modules:
//! - `loadbalancer.rs` - Octavia operations (load balancers, listeners, pools, members, L7)
//! - `network.rs` - Neutron operations (security groups and rules, ports, subnets)
//! - `helpers.rs` - filter matching, call counters and failure injection
//!
//! Both mocks answer duplicate creates with 409 the way the real services do,
//! count every call by operation name, and can be scripted to fail.

mod helpers;
mod loadbalancer;
mod network;

pub use helpers::MockFailure;

use crate::error::OpenStackError;
use crate::models::*;
use crate::openstack_trait::{LoadBalancerClientTrait, NetworkClientTrait};
use helpers::{lock, CallBook};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Mock Octavia client
///
/// Operation names used by [`call_count`](Self::call_count) and
/// [`inject_failure`](Self::inject_failure) are the trait method names, except
/// creates which are `post_<resource_key>` (e.g. `post_listener`, `post_rule`).
#[derive(Debug, Clone)]
pub struct MockLoadBalancerClient {
    pub(crate) load_balancers: Arc<Mutex<HashMap<String, LoadBalancer>>>,
    pub(crate) listeners: Arc<Mutex<HashMap<String, Listener>>>,
    pub(crate) pools: Arc<Mutex<HashMap<String, Pool>>>,
    // pool id -> member id -> member
    pub(crate) members: Arc<Mutex<HashMap<String, HashMap<String, Member>>>>,
    pub(crate) l7_policies: Arc<Mutex<HashMap<String, L7Policy>>>,
    // policy id -> rule id -> rule
    pub(crate) l7_rules: Arc<Mutex<HashMap<String, HashMap<String, L7Rule>>>>,
    pub(crate) versions: Arc<Mutex<VersionMap>>,
    // statuses handed out by successive get_load_balancer calls
    pub(crate) status_scripts: Arc<Mutex<HashMap<String, VecDeque<ProvisioningStatus>>>>,
    pub(crate) created_status: Arc<Mutex<ProvisioningStatus>>,
    pub(crate) provider_override: Arc<Mutex<Option<String>>>,
    pub(crate) ignored_deletes: Arc<Mutex<usize>>,
    pub(crate) book: CallBook,
}

impl Default for MockLoadBalancerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLoadBalancerClient {
    /// Create an empty mock; created load balancers come up ACTIVE
    pub fn new() -> Self {
        Self {
            load_balancers: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            pools: Arc::new(Mutex::new(HashMap::new())),
            members: Arc::new(Mutex::new(HashMap::new())),
            l7_policies: Arc::new(Mutex::new(HashMap::new())),
            l7_rules: Arc::new(Mutex::new(HashMap::new())),
            versions: Arc::new(Mutex::new(VersionMap::new())),
            status_scripts: Arc::new(Mutex::new(HashMap::new())),
            created_status: Arc::new(Mutex::new(ProvisioningStatus::Active)),
            provider_override: Arc::new(Mutex::new(None)),
            ignored_deletes: Arc::new(Mutex::new(0)),
            book: CallBook::default(),
        }
    }

    /// Report these version ids (e.g. `"v2.12"`) for `region`
    pub fn set_versions(&self, region: &str, versions: &[&str]) {
        let data = versions
            .iter()
            .map(|v| VersionData {
                id: (*v).to_string(),
                status: None,
                version: None,
            })
            .collect();
        let mut services = BTreeMap::new();
        services.insert("load-balancer".to_string(), data);
        lock(&self.versions).insert(region.to_string(), services);
    }

    /// Replace the whole version map
    pub fn set_version_data(&self, data: VersionMap) {
        *lock(&self.versions) = data;
    }

    /// Status given to load balancers created from now on
    pub fn set_created_status(&self, status: ProvisioningStatus) {
        *lock(&self.created_status) = status;
    }

    /// Provider reported for created load balancers regardless of the request
    pub fn set_provider_override(&self, provider: Option<&str>) {
        *lock(&self.provider_override) = provider.map(str::to_string);
    }

    /// Queue statuses applied by successive `get_load_balancer` calls.
    /// The last one sticks.
    pub fn script_statuses(&self, lb_id: &str, statuses: &[ProvisioningStatus]) {
        lock(&self.status_scripts)
            .entry(lb_id.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Set the current status of a stored load balancer
    pub fn set_lb_status(&self, lb_id: &str, status: ProvisioningStatus) {
        if let Some(lb) = lock(&self.load_balancers).get_mut(lb_id) {
            lb.provisioning_status = status;
        }
    }

    /// Accept the next `n` load balancer deletes without deleting anything
    pub fn ignore_deletes(&self, n: usize) {
        *lock(&self.ignored_deletes) = n;
    }

    /// Make the next `times` calls of `op` fail
    pub fn inject_failure(&self, op: &str, failure: MockFailure, times: usize) {
        self.book.inject(op, failure, times);
    }

    /// Number of calls made to `op`
    pub fn call_count(&self, op: &str) -> usize {
        self.book.calls(op)
    }

    /// Forget all call counts
    pub fn reset_calls(&self) {
        self.book.reset_calls();
    }

    /// Add a load balancer to the mock store (for test setup)
    pub fn add_load_balancer(&self, lb: LoadBalancer) {
        lock(&self.load_balancers).insert(lb.id.clone(), lb);
    }

    /// Add a listener to the mock store (for test setup)
    pub fn add_listener(&self, listener: Listener) {
        lock(&self.listeners).insert(listener.id.clone(), listener);
    }

    /// Add a pool to the mock store (for test setup)
    pub fn add_pool(&self, pool: Pool) {
        lock(&self.pools).insert(pool.id.clone(), pool);
    }

    /// Add a member to the mock store (for test setup)
    pub fn add_member(&self, pool_id: &str, member: Member) {
        lock(&self.members)
            .entry(pool_id.to_string())
            .or_default()
            .insert(member.id.clone(), member);
    }

    /// Add an L7 policy to the mock store (for test setup)
    pub fn add_l7_policy(&self, policy: L7Policy) {
        lock(&self.l7_policies).insert(policy.id.clone(), policy);
    }

    /// Stored load balancer
    pub fn load_balancer(&self, id: &str) -> Option<LoadBalancer> {
        lock(&self.load_balancers).get(id).cloned()
    }

    /// Stored listener
    pub fn listener(&self, id: &str) -> Option<Listener> {
        lock(&self.listeners).get(id).cloned()
    }

    /// Stored member
    pub fn member(&self, pool_id: &str, id: &str) -> Option<Member> {
        lock(&self.members).get(pool_id).and_then(|m| m.get(id)).cloned()
    }

    /// Number of stored resources of `kind`
    pub fn count(&self, kind: LbResourceKind) -> usize {
        match kind {
            LbResourceKind::LoadBalancer => lock(&self.load_balancers).len(),
            LbResourceKind::Listener => lock(&self.listeners).len(),
            LbResourceKind::Pool => lock(&self.pools).len(),
            LbResourceKind::Member => lock(&self.members).values().map(HashMap::len).sum(),
            LbResourceKind::L7Policy => lock(&self.l7_policies).len(),
            LbResourceKind::L7Rule => lock(&self.l7_rules).values().map(HashMap::len).sum(),
        }
    }
}

#[async_trait::async_trait]
impl LoadBalancerClientTrait for MockLoadBalancerClient {
    async fn get_all_version_data(&self) -> Result<VersionMap, OpenStackError> {
        self.book.record("get_all_version_data")?;
        Ok(lock(&self.versions).clone())
    }

    async fn post_resource(
        &self,
        kind: LbResourceKind,
        parent_id: Option<&str>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, OpenStackError> {
        loadbalancer::post_resource(self, kind, parent_id, body).await
    }

    async fn load_balancers(&self, filters: &[(&str, &str)]) -> Result<Vec<LoadBalancer>, OpenStackError> {
        loadbalancer::load_balancers(self, filters).await
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer, OpenStackError> {
        loadbalancer::get_load_balancer(self, id).await
    }

    async fn delete_load_balancer(&self, id: &str, cascade: bool) -> Result<(), OpenStackError> {
        loadbalancer::delete_load_balancer(self, id, cascade).await
    }

    async fn listeners(&self, filters: &[(&str, &str)]) -> Result<Vec<Listener>, OpenStackError> {
        loadbalancer::listeners(self, filters).await
    }

    async fn update_listener(&self, id: &str, body: serde_json::Value) -> Result<Listener, OpenStackError> {
        loadbalancer::update_listener(self, id, body).await
    }

    async fn delete_listener(&self, id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_listener(self, id).await
    }

    async fn pools(&self, filters: &[(&str, &str)]) -> Result<Vec<Pool>, OpenStackError> {
        loadbalancer::pools(self, filters).await
    }

    async fn delete_pool(&self, id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_pool(self, id).await
    }

    async fn members(&self, pool_id: &str, filters: &[(&str, &str)]) -> Result<Vec<Member>, OpenStackError> {
        loadbalancer::members(self, pool_id, filters).await
    }

    async fn update_member(&self, pool_id: &str, id: &str, name: &str) -> Result<Member, OpenStackError> {
        loadbalancer::update_member(self, pool_id, id, name).await
    }

    async fn delete_member(&self, pool_id: &str, id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_member(self, pool_id, id).await
    }

    async fn l7_policies(&self, filters: &[(&str, &str)]) -> Result<Vec<L7Policy>, OpenStackError> {
        loadbalancer::l7_policies(self, filters).await
    }

    async fn delete_l7_policy(&self, id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_l7_policy(self, id).await
    }

    async fn l7_rules(&self, l7policy_id: &str, filters: &[(&str, &str)]) -> Result<Vec<L7Rule>, OpenStackError> {
        loadbalancer::l7_rules(self, l7policy_id, filters).await
    }

    async fn update_l7_rule(&self, l7policy_id: &str, id: &str, value: &str) -> Result<L7Rule, OpenStackError> {
        loadbalancer::update_l7_rule(self, l7policy_id, id, value).await
    }

    async fn delete_l7_rule(&self, l7policy_id: &str, id: &str) -> Result<(), OpenStackError> {
        loadbalancer::delete_l7_rule(self, l7policy_id, id).await
    }
}

/// Mock Neutron client
///
/// Rules are stored apart from their groups; listed groups carry their
/// current rules. Operation names are the trait method names.
#[derive(Debug, Clone, Default)]
pub struct MockNetworkClient {
    pub(crate) security_groups: Arc<Mutex<HashMap<String, SecurityGroup>>>,
    pub(crate) rules: Arc<Mutex<HashMap<String, SecurityGroupRule>>>,
    pub(crate) ports: Arc<Mutex<HashMap<String, Port>>>,
    pub(crate) subnets: Arc<Mutex<HashMap<String, Subnet>>>,
    pub(crate) subnet_pools: Arc<Mutex<HashMap<String, SubnetPool>>>,
    pub(crate) book: CallBook,
}

impl MockNetworkClient {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail
    pub fn inject_failure(&self, op: &str, failure: MockFailure, times: usize) {
        self.book.inject(op, failure, times);
    }

    /// Number of calls made to `op`
    pub fn call_count(&self, op: &str) -> usize {
        self.book.calls(op)
    }

    /// Forget all call counts
    pub fn reset_calls(&self) {
        self.book.reset_calls();
    }

    /// Add a security group (and any rules it carries) to the mock store (for test setup)
    pub fn add_security_group(&self, mut group: SecurityGroup) {
        let rules = std::mem::take(&mut group.security_group_rules);
        lock(&self.security_groups).insert(group.id.clone(), group);
        for rule in rules {
            self.add_rule(rule);
        }
    }

    /// Add a security group rule to the mock store (for test setup)
    pub fn add_rule(&self, rule: SecurityGroupRule) {
        lock(&self.rules).insert(rule.id.clone(), rule);
    }

    /// Add a port to the mock store (for test setup)
    pub fn add_port(&self, port: Port) {
        lock(&self.ports).insert(port.id.clone(), port);
    }

    /// Add a subnet to the mock store (for test setup)
    pub fn add_subnet(&self, subnet: Subnet) {
        lock(&self.subnets).insert(subnet.id.clone(), subnet);
    }

    /// Add a subnet pool to the mock store (for test setup)
    pub fn add_subnet_pool(&self, pool: SubnetPool) {
        lock(&self.subnet_pools).insert(pool.id.clone(), pool);
    }

    /// Stored security group, with its current rules
    pub fn security_group(&self, id: &str) -> Option<SecurityGroup> {
        let mut group = lock(&self.security_groups).get(id).cloned()?;
        group.security_group_rules = self.rules_of(id);
        Some(group)
    }

    /// Rules currently stored for a security group, sorted by id
    pub fn rules_of(&self, security_group_id: &str) -> Vec<SecurityGroupRule> {
        let mut rules: Vec<_> = lock(&self.rules)
            .values()
            .filter(|r| r.security_group_id == security_group_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Stored port
    pub fn port(&self, id: &str) -> Option<Port> {
        lock(&self.ports).get(id).cloned()
    }
}

#[async_trait::async_trait]
impl NetworkClientTrait for MockNetworkClient {
    async fn list_security_groups(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroup>, OpenStackError> {
        network::list_security_groups(self, filters).await
    }

    async fn create_security_group(&self, request: &CreateSecurityGroup) -> Result<SecurityGroup, OpenStackError> {
        network::create_security_group(self, request).await
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), OpenStackError> {
        network::delete_security_group(self, id).await
    }

    async fn set_security_group_tags(&self, id: &str, tags: &[String]) -> Result<(), OpenStackError> {
        network::set_security_group_tags(self, id, tags).await
    }

    async fn list_security_group_rules(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroupRule>, OpenStackError> {
        network::list_security_group_rules(self, filters).await
    }

    async fn create_security_group_rule(&self, request: &CreateSecurityGroupRule) -> Result<SecurityGroupRule, OpenStackError> {
        network::create_security_group_rule(self, request).await
    }

    async fn delete_security_group_rule(&self, id: &str) -> Result<(), OpenStackError> {
        network::delete_security_group_rule(self, id).await
    }

    async fn list_ports(&self, filters: &[(&str, &str)]) -> Result<Vec<Port>, OpenStackError> {
        network::list_ports(self, filters).await
    }

    async fn get_port(&self, id: &str) -> Result<Port, OpenStackError> {
        network::get_port(self, id).await
    }

    async fn update_port_security_groups(&self, id: &str, security_groups: &[String]) -> Result<Port, OpenStackError> {
        network::update_port_security_groups(self, id, security_groups).await
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet, OpenStackError> {
        network::get_subnet(self, id).await
    }

    async fn get_subnet_pool(&self, id: &str) -> Result<SubnetPool, OpenStackError> {
        network::get_subnet_pool(self, id).await
    }
}
