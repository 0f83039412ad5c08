//! Listener ACL updates

use crate::backoff::FAST_POLL_INTERVAL;
use crate::driver::LbaasDriver;
use crate::error::{DriverError, Result};
use crate::objects::LoadBalancer;
use serde_json::{json, Value};
use tracing::{debug, error, info};

/// Request body replacing a listener's ACL.
///
/// `None` opens the listener to everyone, an empty list closes it.
pub(crate) fn acl_body(allowed_cidrs: Option<Vec<String>>) -> Value {
    match allowed_cidrs {
        None => json!({"allowed_cidrs": null, "admin_state_up": true}),
        Some(mut cidrs) => {
            cidrs.sort();
            cidrs.dedup();
            let enabled = !cidrs.is_empty();
            json!({"allowed_cidrs": cidrs, "admin_state_up": enabled})
        }
    }
}

impl LbaasDriver {
    /// Replace the allowed CIDRs of a listener.
    ///
    /// Skipped with a debug log when the load balancer doesn't settle in time.
    /// A rejected update surfaces as [`DriverError::ResourceNotReady`] so the
    /// caller retries.
    pub async fn update_listener_acls(
        &self,
        lb: &LoadBalancer,
        listener_id: &str,
        allowed_cidrs: Option<Vec<String>>,
    ) -> Result<()> {
        if let Err(e) = self
            .monitor
            .wait_for_provisioning(lb, self.config.activation_timeout, FAST_POLL_INTERVAL)
            .await
        {
            if e.is_not_ready() {
                debug!("Skipping ACL update of listener {}: {}", listener_id, e);
                return Ok(());
            }
            return Err(e);
        }

        let body = acl_body(allowed_cidrs);
        match self.lbaas.update_listener(listener_id, body).await {
            Ok(listener) => {
                info!(
                    "Listener {} of {} now allows {:?} (enabled: {})",
                    listener_id, lb.name, listener.allowed_cidrs, listener.admin_state_up
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to update ACL of listener {}: {}", listener_id, e);
                Err(DriverError::ResourceNotReady(format!("listener {}", listener_id)))
            }
        }
    }
}
