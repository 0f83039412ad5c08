//! API version discovery models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a service's version document (`GET /` on the endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    /// Version identifier, e.g. `v2.12`
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Explicit version string when the service reports one separately from `id`
    #[serde(default)]
    pub version: Option<String>,
}

impl VersionData {
    /// The most specific version string available
    pub fn version_string(&self) -> &str {
        self.version.as_deref().unwrap_or(&self.id)
    }
}

/// Version data grouped by region, then by service type
pub type VersionMap = BTreeMap<String, BTreeMap<String, Vec<VersionData>>>;
