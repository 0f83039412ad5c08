//! OpenStack Load Balancer and Network API Clients
//!
//! A Rust client library for the parts of the Octavia (load-balancer v2) and
//! Neutron (network v2.0) REST APIs needed to reconcile service load balancers.
//!
//! # Example
//!
//! ```no_run
//! use openstack_client::{LoadBalancerClientTrait, OctaviaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let octavia = OctaviaClient::new(
//!     "https://octavia:9876".to_string(),
//!     "keystone-token".to_string(),
//!     Some("RegionOne".to_string()),
//! )?;
//!
//! // Discover the API version the endpoint speaks
//! let versions = octavia.get_all_version_data().await?;
//!
//! // Query listeners of a load balancer
//! let listeners = octavia.listeners(&[("loadbalancer_id", "lb-uuid")]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Typed models** for load balancers, listeners, pools, members, L7 policies/rules,
//!   security groups, ports and subnets
//! - **Error classification**: every failure maps to a [`ResponseClass`]
//! - **Mocks** (`test-util` feature): in-memory clients with call counters and failure injection

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod openstack_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{NeutronClient, OctaviaClient};
pub use common::HttpClient;
pub use error::{OpenStackError, ResponseClass};
pub use models::*;
pub use openstack_trait::{LoadBalancerClientTrait, NetworkClientTrait};
#[cfg(feature = "test-util")]
pub use mock::{MockFailure, MockLoadBalancerClient, MockNetworkClient};
