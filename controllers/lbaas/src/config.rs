//! Driver configuration
//!
//! Settings are read from `LBAAS_*` environment variables; anything unset
//! keeps its default.

use crate::error::{DriverError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How the engine manages the load balancer's security group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SgMode {
    /// Create a dedicated group named after the load balancer and attach it to the VIP port
    Create,
    /// Edit the group the backend attached to the VIP port
    #[default]
    Update,
}

impl FromStr for SgMode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(SgMode::Create),
            "update" => Ok(SgMode::Update),
            other => Err(DriverError::InvalidConfig(format!("unknown sg mode '{}'", other))),
        }
    }
}

/// Which isolation model drives the services' security groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceSecurityGroupsDriver {
    /// No isolation
    #[default]
    Default,
    /// Per-namespace isolation
    Namespace,
    /// Network-policy isolation
    Policy,
}

impl FromStr for ServiceSecurityGroupsDriver {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(ServiceSecurityGroupsDriver::Default),
            "namespace" => Ok(ServiceSecurityGroupsDriver::Namespace),
            "policy" => Ok(ServiceSecurityGroupsDriver::Policy),
            other => Err(DriverError::InvalidConfig(format!(
                "unknown service security groups driver '{}'",
                other
            ))),
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Overall budget for provisioning waits, ensure and release loops
    pub activation_timeout: Duration,
    /// Region used for capability detection
    pub region_name: Option<String>,
    /// Tags applied to every created resource
    pub resource_tags: Vec<String>,
    pub sg_mode: SgMode,
    /// Mirror isolation policy onto the load balancer
    pub enforce_sg_rules: bool,
    pub service_security_groups_driver: ServiceSecurityGroupsDriver,
    /// Groups whose presence on a service means "isolation disabled"
    pub pod_security_groups: Vec<String>,
    /// Namespace marker group: allow from all pod subnets
    pub sg_allow_from_default: Option<String>,
    /// Namespace marker group: allow from the default/global namespaces
    pub sg_allow_from_namespaces: Option<String>,
    /// Subnet pool whose prefixes `sg_allow_from_default` resolves to
    pub pod_subnet_pool: Option<String>,
    /// Worker node subnet always granted ingress
    pub worker_nodes_subnet: Option<String>,
    /// Listener client data timeout in milliseconds, sent only when non-zero
    pub timeout_client_data: Option<u32>,
    /// Listener member data timeout in milliseconds, sent only when non-zero
    pub timeout_member_data: Option<u32>,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(300),
            region_name: None,
            resource_tags: Vec::new(),
            sg_mode: SgMode::default(),
            enforce_sg_rules: true,
            service_security_groups_driver: ServiceSecurityGroupsDriver::default(),
            pod_security_groups: Vec::new(),
            sg_allow_from_default: None,
            sg_allow_from_namespaces: None,
            pod_subnet_pool: None,
            worker_nodes_subnet: None,
            timeout_client_data: None,
            timeout_member_data: None,
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 1024,
        }
    }
}

impl DriverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LBAAS_ACTIVATION_TIMEOUT") {
            config.activation_timeout = Duration::from_secs(parse(&v, "LBAAS_ACTIVATION_TIMEOUT")?);
        }
        config.region_name = get("LBAAS_REGION_NAME");
        if let Some(v) = get("LBAAS_RESOURCE_TAGS") {
            config.resource_tags = split_list(&v);
        }
        if let Some(v) = get("LBAAS_SG_MODE") {
            config.sg_mode = v.parse()?;
        }
        if let Some(v) = get("LBAAS_ENFORCE_SG_RULES") {
            config.enforce_sg_rules = parse_bool(&v, "LBAAS_ENFORCE_SG_RULES")?;
        }
        if let Some(v) = get("LBAAS_SERVICE_SG_DRIVER") {
            config.service_security_groups_driver = v.parse()?;
        }
        if let Some(v) = get("LBAAS_POD_SECURITY_GROUPS") {
            config.pod_security_groups = split_list(&v);
        }
        config.sg_allow_from_default = get("LBAAS_SG_ALLOW_FROM_DEFAULT");
        config.sg_allow_from_namespaces = get("LBAAS_SG_ALLOW_FROM_NAMESPACES");
        config.pod_subnet_pool = get("LBAAS_POD_SUBNET_POOL");
        config.worker_nodes_subnet = get("LBAAS_WORKER_NODES_SUBNET");
        if let Some(v) = get("LBAAS_TIMEOUT_CLIENT_DATA") {
            config.timeout_client_data = Some(parse(&v, "LBAAS_TIMEOUT_CLIENT_DATA")?);
        }
        if let Some(v) = get("LBAAS_TIMEOUT_MEMBER_DATA") {
            config.timeout_member_data = Some(parse(&v, "LBAAS_TIMEOUT_MEMBER_DATA")?);
        }
        if let Some(v) = get("LBAAS_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(parse(&v, "LBAAS_CACHE_TTL")?);
        }
        if let Some(v) = get("LBAAS_CACHE_MAX_ENTRIES") {
            config.cache_max_entries = parse(&v, "LBAAS_CACHE_MAX_ENTRIES")?;
        }

        if config.activation_timeout.is_zero() {
            return Err(DriverError::InvalidConfig(
                "LBAAS_ACTIVATION_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// Whether namespace isolation is active
    pub fn namespace_isolation(&self) -> bool {
        self.service_security_groups_driver == ServiceSecurityGroupsDriver::Namespace
    }

    /// Whether network-policy isolation is active
    pub fn network_policy(&self) -> bool {
        self.service_security_groups_driver == ServiceSecurityGroupsDriver::Policy
    }
}

fn parse<T: FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DriverError::InvalidConfig(format!("{} has invalid value '{}'", key, value)))
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DriverError::InvalidConfig(format!("{} has invalid value '{}'", key, value))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
