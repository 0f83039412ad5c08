//! Query utilities for OpenStack list endpoints
//!
//! Octavia and Neutron both answer list calls with `{"<resources_key>": [...]}`.

use crate::common::HttpClient;
use crate::error::OpenStackError;
use serde::de::DeserializeOwned;

/// Query a collection with optional filtering
pub async fn list_resources<T: DeserializeOwned>(
    http: &HttpClient,
    path: &str,
    resources_key: &str,
    filters: &[(&str, &str)],
) -> Result<Vec<T>, OpenStackError> {
    let url = if filters.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, http.build_query_string(filters))
    };

    let mut body: serde_json::Value = http.get(&url).await?;
    unwrap_key(&mut body, resources_key)
}

/// Take `key` out of a response envelope and deserialize it
pub fn unwrap_key<T: DeserializeOwned>(
    body: &mut serde_json::Value,
    key: &str,
) -> Result<T, OpenStackError> {
    let inner = body
        .get_mut(key)
        .map(serde_json::Value::take)
        .ok_or_else(|| OpenStackError::InvalidResponse(format!("missing '{}' in response", key)))?;
    Ok(serde_json::from_value(inner)?)
}
