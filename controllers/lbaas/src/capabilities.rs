//! Backend capability detection
//!
//! The load-balancing API advertises its supported versions per region and
//! service. The highest version of the selected region/service decides which
//! optional features the driver may use. Detection runs once per driver.

use crate::error::Result;
use openstack_client::{LbResourceKind, LoadBalancerClientTrait, VersionMap};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};

/// Service type whose versions are preferred when several are listed
const LOAD_BALANCER_SERVICE: &str = "load-balancer";

/// Load-balancing API version (`MAJOR.MINOR`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `[v]MAJOR.MINOR[.PATCH]`; anything else is rejected
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').or_else(|| s.strip_prefix('V')).unwrap_or(s);
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        if let Some(patch) = parts.next() {
            patch.parse::<u32>().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

const TAGGING_VERSION: ApiVersion = ApiVersion::new(2, 5);
const DOUBLE_LISTENERS_VERSION: ApiVersion = ApiVersion::new(2, 11);
const ACL_VERSION: ApiVersion = ApiVersion::new(2, 12);

/// Optional backend features, fixed for the driver's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub version: ApiVersion,
    /// Resources accept `tags`
    pub tagging: bool,
    /// A port may carry one TCP and one UDP listener
    pub double_listeners: bool,
    /// Listeners accept `allowed_cidrs`
    pub acls: bool,
}

impl Capabilities {
    /// Capabilities implied by `version`
    pub fn from_version(version: ApiVersion) -> Self {
        Self {
            version,
            tagging: version >= TAGGING_VERSION,
            double_listeners: version >= DOUBLE_LISTENERS_VERSION,
            acls: version >= ACL_VERSION,
        }
    }

    /// Pick the backend version out of discovered version data.
    ///
    /// Uses `region` when present, otherwise the first region in sorted order;
    /// within it the load-balancer service, otherwise the first service.
    pub fn select_version(data: &VersionMap, region: Option<&str>) -> ApiVersion {
        let services = region
            .and_then(|r| data.get(r))
            .or_else(|| data.values().next());
        let Some(services) = services else {
            return ApiVersion::default();
        };
        let versions = services
            .get(LOAD_BALANCER_SERVICE)
            .or_else(|| services.values().next());

        versions
            .into_iter()
            .flatten()
            .filter_map(|v| ApiVersion::parse(v.version_string()))
            .max()
            .unwrap_or_default()
    }

    /// Query the backend once and derive its capabilities
    pub async fn detect(client: &dyn LoadBalancerClientTrait, region: Option<&str>) -> Result<Self> {
        let data = client.get_all_version_data().await?;
        let version = Self::select_version(&data, region);
        let capabilities = Self::from_version(version);
        info!(
            "Detected load balancer API version {} (tagging: {}, double listeners: {}, ACLs: {})",
            version, capabilities.tagging, capabilities.double_listeners, capabilities.acls
        );
        Ok(capabilities)
    }

    /// Attach `tags` to a create request.
    ///
    /// Without tagging support the tags go into the description instead, for
    /// the kinds that have one.
    pub fn add_tags(&self, kind: LbResourceKind, body: &mut Value, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        if self.tagging {
            body["tags"] = json!(tags);
            return;
        }
        match kind {
            LbResourceKind::LoadBalancer
            | LbResourceKind::Listener
            | LbResourceKind::Pool
            | LbResourceKind::L7Policy => {
                body["description"] = json!(tags.join(","));
            }
            LbResourceKind::Member | LbResourceKind::L7Rule => {
                debug!("No tagging support, leaving {} untagged", kind.resource_key());
            }
        }
    }
}
