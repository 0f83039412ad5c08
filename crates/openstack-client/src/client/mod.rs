//! OpenStack API clients
//!
//! `OctaviaClient` talks to the load-balancer v2 API (`/v2/lbaas/...`),
//! `NeutronClient` to the network v2.0 API (`/v2.0/...`). Both authenticate
//! with a pre-issued Keystone token.

mod neutron;
mod octavia;

pub use neutron::NeutronClient;
pub use octavia::OctaviaClient;

use crate::error::OpenStackError;
use reqwest::Client;
use std::time::Duration;

/// Build the reqwest client shared by both API clients
pub(crate) fn build_http_client() -> Result<Client, OpenStackError> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}
