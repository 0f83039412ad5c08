//! Driver error types.
//!
//! Every failure the engine surfaces is one of these. Backend failures keep
//! their [`ResponseClass`](openstack_client::ResponseClass) so callers can
//! still dispatch on them.

use openstack_client::OpenStackError;
use thiserror::Error;

/// Errors that can occur while reconciling load-balancer resources.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A resource did not converge within the activation timeout; retry later
    #[error("Resource not ready: {0}")]
    ResourceNotReady(String),

    /// The load balancer did not reach ACTIVE within the timeout
    #[error("Load balancer {id} not ready, last status {status}")]
    LoadBalancerNotReady {
        /// Load balancer ID
        id: String,
        /// Last observed provisioning status
        status: String,
    },

    /// The resource was found in ERROR or DELETED state and has been cleaned up.
    /// All cached identifiers for it must be discarded.
    #[error("{kind} {name} ({id}) removed, status {state}")]
    Removed {
        /// Resource kind, e.g. `loadbalancer`
        kind: String,
        /// Backend ID, if one was known
        id: String,
        /// Resource name
        name: String,
        /// Status that triggered the removal
        state: String,
    },

    /// Input that contradicts the persisted state
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend API error
    #[error("Backend error: {0}")]
    Backend(#[from] OpenStackError),
}

impl DriverError {
    /// Whether this is one of the "retry later" errors
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            DriverError::ResourceNotReady(_) | DriverError::LoadBalancerNotReady { .. }
        )
    }

    /// Whether this is the "state invalidated" signal
    pub fn is_removed(&self) -> bool {
        matches!(self, DriverError::Removed { .. })
    }

    /// The backend error, if this wraps one
    pub fn backend(&self) -> Option<&OpenStackError> {
        match self {
            DriverError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

/// Result alias used throughout the driver
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(DriverError::ResourceNotReady("x".to_string()).is_not_ready());
        assert!(DriverError::LoadBalancerNotReady {
            id: "lb".to_string(),
            status: "PENDING_UPDATE".to_string(),
        }
        .is_not_ready());

        let removed = DriverError::Removed {
            kind: "loadbalancer".to_string(),
            id: "lb".to_string(),
            name: "ns/svc".to_string(),
            state: "ERROR".to_string(),
        };
        assert!(removed.is_removed());
        assert!(!removed.is_not_ready());
        assert_eq!(removed.to_string(), "loadbalancer ns/svc (lb) removed, status ERROR");
    }

    #[test]
    fn test_backend_error_keeps_class() {
        let err: DriverError = OpenStackError::NotFound("gone".to_string()).into();
        assert!(err.backend().is_some_and(OpenStackError::is_not_found));
    }
}
