//! Test utilities for unit testing the driver
//!
//! Virtual time, a recording state store and fixtures that seed the mock
//! clients with a load balancer, its VIP port and the subnets behind it.

use crate::backoff::{Clock, Jitter};
use crate::capabilities::{ApiVersion, Capabilities};
use crate::config::DriverConfig;
use crate::driver::LbaasDriver;
use crate::error::Result;
use crate::objects::{LbaasState, LoadBalancer};
use crate::state::LbaasStateStore;
use openstack_client::models as api;
use openstack_client::{
    FixedIp, MockLoadBalancerClient, MockNetworkClient, Port, ProvisioningStatus, SecurityGroup, SecurityGroupRule,
    Subnet, SubnetPool,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const PROJECT_ID: &str = "project-1";
pub const VIP_SUBNET_ID: &str = "subnet-vip";
pub const VIP_SUBNET_CIDR: &str = "10.10.0.0/24";
pub const VIP_ADDRESS: &str = "10.10.0.5";
pub const WORKER_SUBNET_ID: &str = "subnet-workers";
pub const WORKER_SUBNET_CIDR: &str = "192.168.0.0/24";
pub const SEEDED_LB_ID: &str = "lb-seeded";
pub const VIP_PORT_ID: &str = "port-vip";

/// Clock that only moves when slept on or advanced
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// State store remembering what it was asked to do
#[derive(Debug, Clone, Default)]
pub struct RecordingStateStore {
    cleared: Arc<Mutex<Vec<String>>>,
    saved: Arc<Mutex<Vec<LbaasState>>>,
}

impl RecordingStateStore {
    /// Names of the load balancers whose state was cleared
    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<LbaasState> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LbaasStateStore for RecordingStateStore {
    async fn clear(&self, loadbalancer: &LoadBalancer) -> Result<()> {
        self.cleared.lock().unwrap().push(loadbalancer.name.clone());
        Ok(())
    }

    async fn save(&self, state: &LbaasState) -> Result<()> {
        self.saved.lock().unwrap().push(state.clone());
        Ok(())
    }
}

/// Mocks, store and clock behind one driver
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub lbaas: MockLoadBalancerClient,
    pub network: MockNetworkClient,
    pub store: RecordingStateStore,
    pub clock: ManualClock,
}

impl TestEnv {
    /// Empty mocks plus the VIP and worker subnets
    pub fn new() -> Self {
        init_tracing();
        let network = MockNetworkClient::new();
        seed_subnets(&network);
        Self {
            lbaas: MockLoadBalancerClient::new(),
            network,
            store: RecordingStateStore::default(),
            clock: ManualClock::new(),
        }
    }

    pub fn driver(&self, config: DriverConfig, capabilities: Capabilities) -> LbaasDriver {
        LbaasDriver::new(
            Arc::new(self.lbaas.clone()),
            Arc::new(self.network.clone()),
            Arc::new(self.store.clone()),
            config,
            capabilities,
        )
        .with_clock(Arc::new(self.clock.clone()), Jitter::Fixed(0.8))
    }

    /// Driver with default configuration talking to a tagging backend without ACLs
    pub fn default_driver(&self) -> LbaasDriver {
        self.driver(test_config(), no_acls())
    }
}

/// Route driver logs to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Defaults with a one-minute activation timeout
pub fn test_config() -> DriverConfig {
    DriverConfig {
        activation_timeout: Duration::from_secs(60),
        ..DriverConfig::default()
    }
}

pub fn no_acls() -> Capabilities {
    Capabilities::from_version(ApiVersion::new(2, 11))
}

pub fn with_acls() -> Capabilities {
    Capabilities::from_version(ApiVersion::new(2, 12))
}

/// Load balancer of service `default/web`, not yet created
pub fn desired_loadbalancer() -> LoadBalancer {
    LoadBalancer::new(
        "default/web",
        PROJECT_ID,
        VIP_SUBNET_ID,
        VIP_ADDRESS.parse().unwrap(),
        Vec::new(),
    )
}

/// Store the desired load balancer in the mock with `status`
pub fn seed_loadbalancer(lbaas: &MockLoadBalancerClient, status: ProvisioningStatus) -> LoadBalancer {
    let mut lb = desired_loadbalancer();
    lbaas.add_load_balancer(api::LoadBalancer {
        id: SEEDED_LB_ID.to_string(),
        name: lb.name.clone(),
        project_id: lb.project_id.clone(),
        description: String::new(),
        vip_address: Some(VIP_ADDRESS.to_string()),
        vip_subnet_id: Some(VIP_SUBNET_ID.to_string()),
        vip_port_id: Some(VIP_PORT_ID.to_string()),
        provider: Some("amphora".to_string()),
        provisioning_status: status,
        operating_status: None,
        listeners: vec![],
        pools: vec![],
        tags: vec![],
        created_at: None,
        updated_at: None,
    });
    lb.id = Some(SEEDED_LB_ID.to_string());
    lb.provider = Some("amphora".to_string());
    lb.port_id = Some(VIP_PORT_ID.to_string());
    lb
}

/// Security group named after `lb`, as the engine would have created it
pub fn seed_lb_security_group(network: &MockNetworkClient, lb: &LoadBalancer) -> String {
    let id = "sg-lb".to_string();
    network.add_security_group(security_group(&id, &lb.name, vec![]));
    id
}

pub fn security_group(id: &str, name: &str, rules: Vec<SecurityGroupRule>) -> SecurityGroup {
    SecurityGroup {
        id: id.to_string(),
        name: name.to_string(),
        project_id: PROJECT_ID.to_string(),
        description: String::new(),
        security_group_rules: rules,
        tags: vec![],
    }
}

/// Ingress rule of `sg`. `ports` is an inclusive range.
pub fn ingress_rule(
    id: &str,
    sg: &str,
    protocol: &str,
    ports: Option<(u16, u16)>,
    cidr: Option<&str>,
) -> SecurityGroupRule {
    SecurityGroupRule {
        id: id.to_string(),
        security_group_id: sg.to_string(),
        direction: "ingress".to_string(),
        ethertype: "IPv4".to_string(),
        protocol: Some(protocol.to_string()),
        port_range_min: ports.map(|(min, _)| min),
        port_range_max: ports.map(|(_, max)| max),
        remote_ip_prefix: cidr.map(str::to_string),
        remote_group_id: None,
        description: String::new(),
        project_id: PROJECT_ID.to_string(),
    }
}

/// VIP port of the seeded load balancer carrying `security_groups`
pub fn seed_vip_port(network: &MockNetworkClient, security_groups: &[&str]) {
    network.add_port(Port {
        id: VIP_PORT_ID.to_string(),
        name: "vip".to_string(),
        network_id: "net-1".to_string(),
        project_id: PROJECT_ID.to_string(),
        fixed_ips: vec![FixedIp {
            subnet_id: VIP_SUBNET_ID.to_string(),
            ip_address: VIP_ADDRESS.to_string(),
        }],
        security_groups: security_groups.iter().map(|s| (*s).to_string()).collect(),
        device_owner: "Octavia".to_string(),
    });
}

pub fn seed_subnets(network: &MockNetworkClient) {
    for (id, cidr) in [(VIP_SUBNET_ID, VIP_SUBNET_CIDR), (WORKER_SUBNET_ID, WORKER_SUBNET_CIDR)] {
        network.add_subnet(Subnet {
            id: id.to_string(),
            name: id.to_string(),
            cidr: cidr.to_string(),
            ip_version: 4,
            network_id: "net-1".to_string(),
            project_id: PROJECT_ID.to_string(),
            subnetpool_id: None,
        });
    }
}

pub fn seed_subnet_pool(network: &MockNetworkClient, id: &str, prefixes: &[&str]) {
    network.add_subnet_pool(SubnetPool {
        id: id.to_string(),
        name: id.to_string(),
        prefixes: prefixes.iter().map(|p| (*p).to_string()).collect(),
    });
}

/// Listener stored in the mock under the seeded load balancer
pub fn seed_listener(lbaas: &MockLoadBalancerClient, id: &str, name: &str, protocol: &str, port: u16) {
    lbaas.add_listener(api::Listener {
        id: id.to_string(),
        name: name.to_string(),
        project_id: PROJECT_ID.to_string(),
        description: String::new(),
        protocol: protocol.to_string(),
        protocol_port: port,
        loadbalancers: vec![api::IdRef {
            id: SEEDED_LB_ID.to_string(),
        }],
        default_pool_id: None,
        provisioning_status: ProvisioningStatus::Active,
        admin_state_up: true,
        allowed_cidrs: None,
        timeout_client_data: None,
        timeout_member_data: None,
        tags: vec![],
    });
}
