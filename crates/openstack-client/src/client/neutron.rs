//! Neutron API client

use crate::common::query::{list_resources, unwrap_key};
use crate::common::HttpClient;
use crate::error::OpenStackError;
use crate::models::*;
use crate::openstack_trait::NetworkClientTrait;
use serde_json::json;

/// Neutron API client
#[derive(Debug, Clone)]
pub struct NeutronClient {
    http: HttpClient,
}

impl NeutronClient {
    /// Create a new Neutron client
    ///
    /// # Arguments
    /// * `endpoint` - Neutron endpoint from the service catalog (e.g., "https://neutron:9696")
    /// * `token` - Keystone token
    pub fn new(endpoint: String, token: String) -> Result<Self, OpenStackError> {
        let client = super::build_http_client()?;
        Ok(Self {
            http: HttpClient::new(client, endpoint, token),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }
}

#[async_trait::async_trait]
impl NetworkClientTrait for NeutronClient {
    async fn list_security_groups(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroup>, OpenStackError> {
        list_resources(&self.http, "/v2.0/security-groups", "security_groups", filters).await
    }

    async fn create_security_group(&self, request: &CreateSecurityGroup) -> Result<SecurityGroup, OpenStackError> {
        let body = json!({ "security_group": request });
        let mut response: serde_json::Value = self.http.post("/v2.0/security-groups", &body).await?;
        unwrap_key(&mut response, "security_group")
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), OpenStackError> {
        self.http.delete(&format!("/v2.0/security-groups/{}", id)).await
    }

    async fn set_security_group_tags(&self, id: &str, tags: &[String]) -> Result<(), OpenStackError> {
        let body = json!({ "tags": tags });
        let _: serde_json::Value = self
            .http
            .put(&format!("/v2.0/security-groups/{}/tags", id), &body)
            .await?;
        Ok(())
    }

    async fn list_security_group_rules(&self, filters: &[(&str, &str)]) -> Result<Vec<SecurityGroupRule>, OpenStackError> {
        list_resources(&self.http, "/v2.0/security-group-rules", "security_group_rules", filters).await
    }

    async fn create_security_group_rule(&self, request: &CreateSecurityGroupRule) -> Result<SecurityGroupRule, OpenStackError> {
        let body = json!({ "security_group_rule": request });
        let mut response: serde_json::Value = self.http.post("/v2.0/security-group-rules", &body).await?;
        unwrap_key(&mut response, "security_group_rule")
    }

    async fn delete_security_group_rule(&self, id: &str) -> Result<(), OpenStackError> {
        self.http.delete(&format!("/v2.0/security-group-rules/{}", id)).await
    }

    async fn list_ports(&self, filters: &[(&str, &str)]) -> Result<Vec<Port>, OpenStackError> {
        list_resources(&self.http, "/v2.0/ports", "ports", filters).await
    }

    async fn get_port(&self, id: &str) -> Result<Port, OpenStackError> {
        let mut body: serde_json::Value = self.http.get(&format!("/v2.0/ports/{}", id)).await?;
        unwrap_key(&mut body, "port")
    }

    async fn update_port_security_groups(&self, id: &str, security_groups: &[String]) -> Result<Port, OpenStackError> {
        let body = json!({ "port": { "security_groups": security_groups } });
        let mut response: serde_json::Value = self.http.put(&format!("/v2.0/ports/{}", id), &body).await?;
        unwrap_key(&mut response, "port")
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet, OpenStackError> {
        let mut body: serde_json::Value = self.http.get(&format!("/v2.0/subnets/{}", id)).await?;
        unwrap_key(&mut body, "subnet")
    }

    async fn get_subnet_pool(&self, id: &str) -> Result<SubnetPool, OpenStackError> {
        let mut body: serde_json::Value = self.http.get(&format!("/v2.0/subnetpools/{}", id)).await?;
        unwrap_key(&mut body, "subnetpool")
    }
}
