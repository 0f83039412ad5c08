//! Generic ensure/release loops shared by every resource kind
//!
//! A kind plugs in through [`ResourceOps`]: how to create it, how to find it
//! by natural key, how to delete it, and optionally how to correct a found
//! resource's name.

use crate::backoff::FAST_POLL_INTERVAL;
use crate::driver::LbaasDriver;
use crate::error::{DriverError, Result};
use crate::objects::{LbaasObject, LoadBalancer};
use openstack_client::{LbResourceKind, OpenStackError, ProvisioningStatus, ResponseClass};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Resource found on the backend by natural key
#[derive(Debug, Clone)]
pub(crate) struct Found<R> {
    pub resource: R,
    pub status: ProvisioningStatus,
}

/// Backend operations of one resource kind
#[async_trait::async_trait]
pub(crate) trait ResourceOps<R: LbaasObject>: Send + Sync {
    /// Create `desired`, returning it with its backend ID
    async fn create(&self, desired: &R) -> Result<R>;

    /// Look up `desired` by natural key
    async fn find(&self, desired: &R) -> Result<Option<Found<R>>>;

    /// Delete once
    async fn delete(&self, resource: &R) -> Result<(), OpenStackError>;

    /// Bring a found resource in line with `desired`. Returns whether anything changed.
    async fn update(&self, _found: &mut R, _desired: &R) -> Result<bool> {
        Ok(false)
    }
}

impl LbaasDriver {
    /// POST a create request and decode the created resource
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        kind: LbResourceKind,
        parent_id: Option<&str>,
        body: Value,
    ) -> Result<T> {
        let created = self.lbaas.post_resource(kind, parent_id, body).await?;
        Ok(serde_json::from_value(created).map_err(OpenStackError::from)?)
    }

    /// Create-or-find once.
    ///
    /// `Ok(None)` means the create reported a possible duplicate but nothing
    /// was found by natural key.
    pub(crate) async fn ensure<R, O>(&self, ops: &O, desired: &R, lb: &LoadBalancer) -> Result<Option<R>>
    where
        R: LbaasObject,
        O: ResourceOps<R>,
    {
        let kind = R::KIND.resource_key();
        match ops.create(desired).await {
            Ok(created) => {
                debug!("Created {} {} ({})", kind, created.name(), created.id().unwrap_or_default());
                return Ok(Some(created));
            }
            Err(DriverError::Backend(e)) if e.is_maybe_exists() => {
                debug!("Create of {} {} reported {}, looking it up", kind, desired.name(), e);
            }
            Err(e) => return Err(e),
        }

        let Some(Found { mut resource, status }) = ops.find(desired).await? else {
            return Ok(None);
        };

        if status == ProvisioningStatus::Error {
            warn!("Releasing {} {} found in ERROR", kind, resource.name());
            self.release(ops, lb, &resource).await?;
            return Err(DriverError::Removed {
                kind: kind.to_string(),
                id: resource.id().unwrap_or_default().to_string(),
                name: resource.name().to_string(),
                state: status.to_string(),
            });
        }

        if resource.name() != desired.name() && ops.update(&mut resource, desired).await? {
            debug!("Updated {} {} ({})", kind, resource.name(), resource.id().unwrap_or_default());
        }
        debug!("Found {} {} ({})", kind, resource.name(), resource.id().unwrap_or_default());
        Ok(Some(resource))
    }

    /// Ensure with retries until the activation timeout.
    ///
    /// Each attempt first waits for `lb` to be ACTIVE. 400 and 404 from the
    /// backend are returned at once; other backend failures are retried.
    pub(crate) async fn ensure_provisioned<R, O>(
        &self,
        ops: &O,
        desired: &R,
        lb: &LoadBalancer,
        interval: Duration,
    ) -> Result<R>
    where
        R: LbaasObject,
        O: ResourceOps<R>,
    {
        let kind = R::KIND.resource_key();
        let mut timer = self.timer(interval);

        while let Some(remaining) = timer.tick().await {
            self.monitor.wait_for_provisioning(lb, remaining, interval).await?;

            match self.ensure(ops, desired, lb).await {
                Ok(Some(resource)) => return Ok(resource),
                Ok(None) => debug!("{} {} neither created nor found, retrying", kind, desired.name()),
                Err(DriverError::Backend(e)) => match e.class() {
                    ResponseClass::BadRequest | ResponseClass::NotFound => return Err(e.into()),
                    _ => warn!("Failed to ensure {} {}: {}, retrying", kind, desired.name(), e),
                },
                Err(e) => return Err(e),
            }
        }

        Err(DriverError::ResourceNotReady(format!("{} {}", kind, desired.name())))
    }

    /// Delete with retries until the activation timeout.
    ///
    /// "Not found" counts as success. Conflict and bad request mean the load
    /// balancer is busy; wait for it and try again.
    pub(crate) async fn release<R, O>(&self, ops: &O, lb: &LoadBalancer, resource: &R) -> Result<()>
    where
        R: LbaasObject,
        O: ResourceOps<R>,
    {
        let kind = R::KIND.resource_key();
        let mut timer = self.timer(FAST_POLL_INTERVAL);

        while let Some(remaining) = timer.tick().await {
            match ops.delete(resource).await {
                Ok(()) => {
                    debug!("Released {} {}", kind, resource.name());
                    return Ok(());
                }
                Err(e) => match e.class() {
                    ResponseClass::NotFound => {
                        debug!("{} {} already gone", kind, resource.name());
                        return Ok(());
                    }
                    ResponseClass::Conflict | ResponseClass::BadRequest => {
                        debug!("Release of {} {} refused ({}), waiting for {}", kind, resource.name(), e, lb.name);
                        self.monitor
                            .wait_for_provisioning(lb, remaining, FAST_POLL_INTERVAL)
                            .await?;
                    }
                    _ => return Err(e.into()),
                },
            }
        }

        Err(DriverError::ResourceNotReady(format!("{} {}", kind, resource.name())))
    }
}

