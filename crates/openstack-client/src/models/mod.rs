//! OpenStack API models

pub mod loadbalancer;
pub mod network;
pub mod version;

pub use loadbalancer::*;
pub use network::*;
pub use version::*;
