//! Load Balancer Driver
//!
//! Reconciles Kubernetes Services onto Octavia load balancers:
//! - Load balancers, listeners, pools, members and L7 policies/rules are
//!   ensured idempotently and released tolerantly
//! - Every mutation waits for the parent load balancer to be ACTIVE, with
//!   jittered exponential backoff bounded by the activation timeout
//! - Backend isolation policy is mirrored onto the load balancer, either as
//!   security group rules or as listener ACLs
//!
//! The driver is a library. The caller provides the OpenStack clients, a
//! [`LbaasStateStore`] for per-service state and a [`DriverConfig`].

pub mod backoff;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod driver;
pub(crate) mod ensure;
pub mod error;
pub mod objects;
pub mod provisioning;
pub mod security;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use capabilities::Capabilities;
pub use config::{DriverConfig, SgMode, ServiceSecurityGroupsDriver};
pub use driver::LbaasDriver;
pub use error::{DriverError, Result};
pub use objects::{L7Policy, L7Rule, LbaasState, Listener, LoadBalancer, Member, MemberTarget, Pool};
pub use security::{ListenerRuleTarget, TargetPort};
pub use state::{LbaasStateStore, NoopStateStore};
