//! Octavia API client

use crate::common::query::{list_resources, unwrap_key};
use crate::common::HttpClient;
use crate::error::OpenStackError;
use crate::models::*;
use crate::openstack_trait::LoadBalancerClientTrait;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Service type Octavia registers in the catalog
pub const LOAD_BALANCER_SERVICE: &str = "load-balancer";

/// Octavia API client
#[derive(Debug, Clone)]
pub struct OctaviaClient {
    http: HttpClient,
    region: String,
}

impl OctaviaClient {
    /// Create a new Octavia client
    ///
    /// # Arguments
    /// * `endpoint` - Octavia endpoint from the service catalog (e.g., "https://octavia:9876")
    /// * `token` - Keystone token
    /// * `region` - region the endpoint belongs to, used to key version data
    pub fn new(endpoint: String, token: String, region: Option<String>) -> Result<Self, OpenStackError> {
        let client = super::build_http_client()?;
        Ok(Self {
            http: HttpClient::new(client, endpoint, token),
            region: region.unwrap_or_else(|| "default".to_string()),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn item_path(kind: LbResourceKind, parent_id: Option<&str>, id: &str) -> String {
        format!("{}/{}", kind.base_path(parent_id), id)
    }
}

#[async_trait::async_trait]
impl LoadBalancerClientTrait for OctaviaClient {
    async fn get_all_version_data(&self) -> Result<VersionMap, OpenStackError> {
        let mut body: serde_json::Value = self.http.get("/").await?;
        let versions: Vec<VersionData> = unwrap_key(&mut body, "versions")?;
        debug!("Octavia endpoint {} reports {} versions", self.base_url(), versions.len());

        let mut services = BTreeMap::new();
        services.insert(LOAD_BALANCER_SERVICE.to_string(), versions);
        let mut map = VersionMap::new();
        map.insert(self.region.clone(), services);
        Ok(map)
    }

    async fn post_resource(
        &self,
        kind: LbResourceKind,
        parent_id: Option<&str>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, OpenStackError> {
        let path = kind.base_path(parent_id);
        let request = json!({ kind.resource_key(): body });
        let mut response: serde_json::Value = self.http.post(&path, &request).await?;
        unwrap_key(&mut response, kind.resource_key())
    }

    async fn load_balancers(&self, filters: &[(&str, &str)]) -> Result<Vec<LoadBalancer>, OpenStackError> {
        let kind = LbResourceKind::LoadBalancer;
        list_resources(&self.http, &kind.base_path(None), kind.resources_key(), filters).await
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer, OpenStackError> {
        let kind = LbResourceKind::LoadBalancer;
        let mut body: serde_json::Value = self.http.get(&Self::item_path(kind, None, id)).await?;
        unwrap_key(&mut body, kind.resource_key())
    }

    async fn delete_load_balancer(&self, id: &str, cascade: bool) -> Result<(), OpenStackError> {
        let mut path = Self::item_path(LbResourceKind::LoadBalancer, None, id);
        if cascade {
            path.push_str("?cascade=true");
        }
        self.http.delete(&path).await
    }

    async fn listeners(&self, filters: &[(&str, &str)]) -> Result<Vec<Listener>, OpenStackError> {
        let kind = LbResourceKind::Listener;
        list_resources(&self.http, &kind.base_path(None), kind.resources_key(), filters).await
    }

    async fn update_listener(&self, id: &str, body: serde_json::Value) -> Result<Listener, OpenStackError> {
        let kind = LbResourceKind::Listener;
        let request = json!({ kind.resource_key(): body });
        let mut response: serde_json::Value =
            self.http.put(&Self::item_path(kind, None, id), &request).await?;
        unwrap_key(&mut response, kind.resource_key())
    }

    async fn delete_listener(&self, id: &str) -> Result<(), OpenStackError> {
        self.http.delete(&Self::item_path(LbResourceKind::Listener, None, id)).await
    }

    async fn pools(&self, filters: &[(&str, &str)]) -> Result<Vec<Pool>, OpenStackError> {
        let kind = LbResourceKind::Pool;
        list_resources(&self.http, &kind.base_path(None), kind.resources_key(), filters).await
    }

    async fn delete_pool(&self, id: &str) -> Result<(), OpenStackError> {
        self.http.delete(&Self::item_path(LbResourceKind::Pool, None, id)).await
    }

    async fn members(&self, pool_id: &str, filters: &[(&str, &str)]) -> Result<Vec<Member>, OpenStackError> {
        let kind = LbResourceKind::Member;
        list_resources(&self.http, &kind.base_path(Some(pool_id)), kind.resources_key(), filters).await
    }

    async fn update_member(&self, pool_id: &str, id: &str, name: &str) -> Result<Member, OpenStackError> {
        let kind = LbResourceKind::Member;
        let request = json!({ kind.resource_key(): { "name": name } });
        let mut response: serde_json::Value = self
            .http
            .put(&Self::item_path(kind, Some(pool_id), id), &request)
            .await?;
        unwrap_key(&mut response, kind.resource_key())
    }

    async fn delete_member(&self, pool_id: &str, id: &str) -> Result<(), OpenStackError> {
        self.http
            .delete(&Self::item_path(LbResourceKind::Member, Some(pool_id), id))
            .await
    }

    async fn l7_policies(&self, filters: &[(&str, &str)]) -> Result<Vec<L7Policy>, OpenStackError> {
        let kind = LbResourceKind::L7Policy;
        list_resources(&self.http, &kind.base_path(None), kind.resources_key(), filters).await
    }

    async fn delete_l7_policy(&self, id: &str) -> Result<(), OpenStackError> {
        self.http.delete(&Self::item_path(LbResourceKind::L7Policy, None, id)).await
    }

    async fn l7_rules(&self, l7policy_id: &str, filters: &[(&str, &str)]) -> Result<Vec<L7Rule>, OpenStackError> {
        let kind = LbResourceKind::L7Rule;
        list_resources(&self.http, &kind.base_path(Some(l7policy_id)), kind.resources_key(), filters).await
    }

    async fn update_l7_rule(&self, l7policy_id: &str, id: &str, value: &str) -> Result<L7Rule, OpenStackError> {
        let kind = LbResourceKind::L7Rule;
        let request = json!({ kind.resource_key(): { "value": value } });
        let mut response: serde_json::Value = self
            .http
            .put(&Self::item_path(kind, Some(l7policy_id), id), &request)
            .await?;
        unwrap_key(&mut response, kind.resource_key())
    }

    async fn delete_l7_rule(&self, l7policy_id: &str, id: &str) -> Result<(), OpenStackError> {
        self.http
            .delete(&Self::item_path(LbResourceKind::L7Rule, Some(l7policy_id), id))
            .await
    }
}
