//! # Reconciler
//!
//! Drives an `AzPermission` from creation to a terminal state:
//!
//! ```text
//! (no status) --claim--> Pending --list--> Ready | Failed
//! ```
//!
//! The claim is a conditional write that only succeeds while the status is
//! still absent, so when the same creation is delivered more than once exactly
//! one invocation proceeds. Nothing is returned as an error: every invocation
//! ends in a [`ReconcileOutcome`] that is logged and counted.

pub mod status;

use crate::controller::backoff::RetryBackoff;
use crate::controller::error::PermissionsError;
use crate::controller::resource_path::ResourcePath;
use crate::crd::{AzPermission, AzPermissionState, AzPermissionStatus};
use crate::observability::metrics;
use crate::provider::PermissionLister;
use crate::store::PermissionStore;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

pub use status::{failed_status, ready_status, update_status_with_retry, StatusUpdate};

/// How a single reconciliation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The object could not be fetched
    NotFound,
    /// Another invocation already claimed the object
    AlreadyHandled,
    /// The claim write failed for a reason other than a lost race
    Dropped,
    /// A terminal status was written
    Completed(AzPermissionState),
    /// The terminal write could not be completed; the object stays Pending
    StuckPending,
    /// Listing exceeded the deadline; the object stays Pending
    TimedOut,
    /// The object was recreated, or finished by another writer, while
    /// listing ran; the result was discarded
    Superseded,
}

impl ReconcileOutcome {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::AlreadyHandled => "already_handled",
            ReconcileOutcome::Dropped => "dropped",
            ReconcileOutcome::Completed(AzPermissionState::Ready) => "ready",
            ReconcileOutcome::Completed(AzPermissionState::Failed) => "failed",
            ReconcileOutcome::Completed(AzPermissionState::Pending) => "pending",
            ReconcileOutcome::StuckPending => "stuck_pending",
            ReconcileOutcome::TimedOut => "timed_out",
            ReconcileOutcome::Superseded => "superseded",
        }
    }
}

/// Reconciler context shared by all reconciliation tasks
pub struct Reconciler {
    store: Arc<dyn PermissionStore>,
    lister: Arc<dyn PermissionLister>,
    /// Client ID reported as `status.principal`
    client_id: String,
    retry: RetryBackoff,
    list_timeout: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("client_id", &self.client_id)
            .field("retry", &self.retry)
            .field("list_timeout", &self.list_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        lister: Arc<dyn PermissionLister>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            lister,
            client_id: client_id.into(),
            retry: RetryBackoff::default(),
            list_timeout: Duration::from_secs(crate::constants::DEFAULT_RECONCILE_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryBackoff) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_list_timeout(mut self, list_timeout: Duration) -> Self {
        self.list_timeout = list_timeout;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Reconcile the named `AzPermission`
    pub async fn reconcile(&self, name: &str) -> ReconcileOutcome {
        let span = info_span!("controller.reconcile", resource.name = name);
        async {
            let start = Instant::now();
            metrics::increment_reconciliations();

            let outcome = self.reconcile_inner(name).await;

            metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
            metrics::increment_reconcile_outcome(outcome.as_str());
            debug!(outcome = outcome.as_str(), "reconciliation finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn reconcile_inner(&self, name: &str) -> ReconcileOutcome {
        let permission = match self.store.get(name).await {
            Ok(permission) => permission,
            Err(e) => {
                warn!("unable to fetch AzPermission {}: {}", name, e);
                return ReconcileOutcome::NotFound;
            }
        };

        if permission.status.is_some() {
            debug!("AzPermission {} already has a status, skipping", name);
            return ReconcileOutcome::AlreadyHandled;
        }

        // Claim the object: only the writer that still sees no status wins.
        let claimed = update_status_with_retry(
            self.store.as_ref(),
            name,
            permission,
            &self.retry,
            |obj| {
                if obj.status.is_some() {
                    return false;
                }
                obj.status = Some(AzPermissionStatus::pending());
                true
            },
        )
        .await;

        let claimed = match claimed {
            Ok(StatusUpdate::Written(obj)) => obj,
            Ok(StatusUpdate::Skipped(_)) => {
                debug!("AzPermission {} was claimed concurrently", name);
                return ReconcileOutcome::AlreadyHandled;
            }
            Err(e) => {
                error!("failed to set AzPermission {} to Pending: {}", name, e);
                return ReconcileOutcome::Dropped;
            }
        };

        let claimed_uid = claimed.metadata.uid.clone();
        let resource_path = claimed.spec.resource_path.clone();
        info!(resource_path = %resource_path, "checking permissions");

        let result = match tokio::time::timeout(
            self.list_timeout,
            self.collect_permissions(&resource_path),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "listing permissions for AzPermission {} exceeded {:?}, leaving it Pending",
                    name, self.list_timeout
                );
                metrics::increment_stuck_pending();
                return ReconcileOutcome::TimedOut;
            }
        };

        let terminal = match result {
            Ok((allowed, denied)) => {
                info!(
                    allowed = allowed.len(),
                    denied = denied.len(),
                    "permissions listed"
                );
                ready_status(&self.client_id, allowed, denied)
            }
            Err(e) => {
                warn!(error_kind = e.kind().as_str(), "permission check failed: {}", e);
                failed_status(&self.client_id, &e)
            }
        };
        let state = terminal.state;

        let latest = match self.store.get(name).await {
            Ok(latest) => latest,
            Err(e) if e.is_not_found() => {
                warn!("AzPermission {} was deleted before its result was written", name);
                return ReconcileOutcome::NotFound;
            }
            Err(e) => {
                error!("unable to re-fetch AzPermission {}: {}", name, e);
                metrics::increment_stuck_pending();
                return ReconcileOutcome::StuckPending;
            }
        };

        let written = update_status_with_retry(
            self.store.as_ref(),
            name,
            latest,
            &self.retry,
            |obj| {
                // Only the object this invocation claimed, and only while Pending
                if obj.metadata.uid != claimed_uid
                    || obj.state() != Some(AzPermissionState::Pending)
                {
                    return false;
                }
                obj.status = Some(terminal.clone());
                true
            },
        )
        .await;

        match written {
            Ok(StatusUpdate::Skipped(_)) => {
                warn!(
                    "AzPermission {} was recreated or updated while listing, discarding {} result",
                    name, state
                );
                ReconcileOutcome::Superseded
            }
            Ok(StatusUpdate::Written(_)) => {
                info!(state = %state, "AzPermission {} updated", name);
                ReconcileOutcome::Completed(state)
            }
            Err(e) => {
                error!(
                    "failed to write {} status for AzPermission {}, it stays Pending: {}",
                    state, name, e
                );
                metrics::increment_stuck_pending();
                ReconcileOutcome::StuckPending
            }
        }
    }

    /// List and concatenate all pages for `resource_path`
    async fn collect_permissions(
        &self,
        resource_path: &str,
    ) -> Result<(Vec<String>, Vec<String>), PermissionsError> {
        let parsed = ResourcePath::parse(resource_path)
            .ok_or_else(|| PermissionsError::InvalidResourcePath(resource_path.to_string()))?;
        debug!("resource path refers to {}", parsed);

        let mut pages = match &parsed {
            ResourcePath::ResourceGroup(group) => {
                self.lister.list_for_resource_group(&group.group)
            }
            ResourcePath::Resource(resource) => self.lister.list_for_resource(resource),
        };

        let mut allowed = Vec::new();
        let mut denied = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page?;
            allowed.extend(page.allowed_actions);
            denied.extend(page.denied_actions);
        }
        Ok((allowed, denied))
    }
}
