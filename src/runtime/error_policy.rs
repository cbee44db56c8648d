//! # Error Policy
//!
//! Classification and backoff for watch stream errors. Reconciliation itself
//! never fails: its outcomes are logged and counted by the reconciler.

use crate::constants;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, warn};

/// Kind of watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or service account token expired
    Unauthorized,
    /// 410: resource version too old, the watch must re-list
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// The watched object vanished
    NotFound,
    Other,
}

/// Classify a watch error from its display string
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    if error_string.contains("401")
        || error_string.contains("Unauthorized")
        || error_string.contains("WatchFailed")
    {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle a watch stream error
///
/// Returns `None` when the watch should be restarted and `Some(())` when the
/// stream can keep going.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("Verify the ClusterRole and ClusterRoleBinding for the azpermissions service account:");
            error!("   kubectl auth can-i watch azpermissions.permissions.azure.com --as=system:serviceaccount:kube-system:azpermissions");
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                constants::DEFAULT_WATCH_RESTART_DELAY_SECS
            );
            tokio::time::sleep(Duration::from_secs(
                constants::DEFAULT_WATCH_RESTART_DELAY_SECS,
            ))
            .await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server throttling (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Watch stream error: {}", error_string);
            tokio::time::sleep(Duration::from_secs(
                constants::DEFAULT_WATCH_RESTART_DELAY_SECS,
            ))
            .await;
            None
        }
    }
}
