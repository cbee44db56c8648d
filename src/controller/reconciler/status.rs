//! # Status Updates
//!
//! Conflict-safe status writes. Each attempt applies the desired change to the
//! freshest copy of the object and writes it back guarded by its resource
//! version; on conflict the object is re-fetched and the change re-applied.

use crate::controller::backoff::RetryBackoff;
use crate::controller::error::PermissionsError;
use crate::crd::{AzPermission, AzPermissionState, AzPermissionStatus};
use crate::observability::metrics;
use crate::store::{PermissionStore, StoreError};
use tracing::debug;

/// Result of a conflict-safe status write
#[derive(Debug)]
pub enum StatusUpdate {
    /// The write landed; carries the stored object
    Written(AzPermission),
    /// The precondition no longer holds on the latest copy; nothing was written
    Skipped(AzPermission),
}

/// Write a status change, retrying on conflict
///
/// `apply` mutates a copy of the latest object and returns `false` when its
/// precondition fails, in which case nothing is written. Conflicts are retried
/// according to `backoff`; when attempts run out the last
/// [`StoreError::Conflict`] is returned. Other store errors are returned
/// immediately.
pub async fn update_status_with_retry<F>(
    store: &dyn PermissionStore,
    name: &str,
    mut current: AzPermission,
    backoff: &RetryBackoff,
    mut apply: F,
) -> Result<StatusUpdate, StoreError>
where
    F: FnMut(&mut AzPermission) -> bool,
{
    let mut attempt = 0;
    loop {
        let mut desired = current.clone();
        if !apply(&mut desired) {
            return Ok(StatusUpdate::Skipped(current));
        }

        match store.update_status(&desired).await {
            Ok(updated) => return Ok(StatusUpdate::Written(updated)),
            Err(e) if e.is_conflict() => {
                metrics::increment_status_conflicts();
                let Some(delay) = backoff.delay_after(attempt) else {
                    return Err(e);
                };
                debug!(
                    resource.name = name,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "status write conflicted, retrying"
                );
                tokio::time::sleep(delay).await;
                current = store.get(name).await?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Terminal status for a successful listing
pub fn ready_status(principal: &str, allowed: Vec<String>, denied: Vec<String>) -> AzPermissionStatus {
    AzPermissionStatus {
        state: AzPermissionState::Ready,
        state_reason: None,
        state_message: None,
        principal: Some(principal.to_string()),
        allowed: Some(allowed),
        denied: Some(denied),
    }
}

/// Terminal status for a failed check
pub fn failed_status(principal: &str, error: &PermissionsError) -> AzPermissionStatus {
    AzPermissionStatus {
        state: AzPermissionState::Failed,
        state_reason: Some(error.kind().as_str().to_string()),
        state_message: Some(error.to_string()),
        principal: Some(principal.to_string()),
        allowed: None,
        denied: None,
    }
}
