//! # Watch Loop
//!
//! Watches `AzPermission` objects cluster-wide, turns watcher events into
//! create/update/delete events and dispatches a reconciliation task for every
//! event that passes the creation predicate.
//!
//! The watcher reports objects, not transitions, so creations are derived by
//! tracking UIDs: the first sighting of a UID is a creation. After a watch
//! restart the re-list only reports objects not seen before as creations.

use crate::config::ControllerConfig;
use crate::controller::predicate::{on_creation, EventKind};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::crd::AzPermission;
use crate::runtime::error_policy::handle_watch_stream_error;
use anyhow::{Context, Result};
use futures::StreamExt;
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use kube::Api;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Initial watch restart backoff after a 429 (milliseconds)
const INITIAL_WATCH_BACKOFF_MS: u64 = 1000;

/// Derives event kinds from the watcher stream
#[derive(Debug, Default)]
pub struct EventTracker {
    seen: HashSet<String>,
    /// UIDs reported by an in-progress re-list
    relist: Option<HashSet<String>>,
}

fn object_key(obj: &AzPermission) -> Option<String> {
    obj.metadata
        .uid
        .clone()
        .or_else(|| obj.metadata.name.clone())
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one watcher event
    pub fn classify(&mut self, event: Event<AzPermission>) -> Option<(EventKind, AzPermission)> {
        match event {
            Event::Apply(obj) => {
                let key = object_key(&obj)?;
                let kind = if self.seen.insert(key) {
                    EventKind::Create
                } else {
                    EventKind::Update
                };
                Some((kind, obj))
            }
            Event::Delete(obj) => {
                if let Some(key) = object_key(&obj) {
                    self.seen.remove(&key);
                }
                Some((EventKind::Delete, obj))
            }
            Event::Init => {
                self.relist = Some(HashSet::new());
                None
            }
            Event::InitApply(obj) => {
                let key = object_key(&obj)?;
                let kind = if self.seen.contains(&key) {
                    EventKind::Generic
                } else {
                    EventKind::Create
                };
                self.relist.get_or_insert_with(HashSet::new).insert(key);
                Some((kind, obj))
            }
            Event::InitDone => {
                if let Some(relist) = self.relist.take() {
                    self.seen = relist;
                }
                None
            }
        }
    }
}

/// Run the watch loop until SIGINT or SIGTERM
pub async fn run_watch_loop(
    api: Api<AzPermission>,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let max_concurrent = config.max_concurrent_reconciles.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let backoff = AtomicU64::new(INITIAL_WATCH_BACKOFF_MS);
    let mut tracker = EventTracker::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(
        "Watching AzPermission resources (max {} concurrent reconciliations)",
        max_concurrent
    );

    'watch: loop {
        let mut stream = watcher(api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();

        loop {
            tokio::select! {
                () = &mut shutdown => break 'watch,
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        backoff.store(INITIAL_WATCH_BACKOFF_MS, Ordering::Relaxed);
                        let Some((kind, obj)) = tracker.classify(event) else {
                            continue;
                        };
                        if !on_creation(kind, &obj) {
                            continue;
                        }
                        let Some(name) = obj.metadata.name.clone() else {
                            continue;
                        };
                        let Some(permit) = acquire_slot(&semaphore, shutdown.as_mut()).await? else {
                            break 'watch;
                        };
                        dispatch(permit, &reconciler, name);
                    }
                    Some(Err(e)) => {
                        let error_string = e.to_string();
                        if handle_watch_stream_error(&error_string, &backoff, config.watch_max_backoff_ms)
                            .await
                            .is_none()
                        {
                            warn!("Restarting AzPermission watch");
                            continue 'watch;
                        }
                    }
                    None => {
                        warn!("AzPermission watch stream ended, restarting");
                        continue 'watch;
                    }
                },
            }
        }
    }

    info!("Shutdown signal received, waiting for in-flight reconciliations");
    server_state.is_ready.store(false, Ordering::Relaxed);
    drain(&semaphore, max_concurrent, config.reconcile_timeout()).await;
    info!("Controller stopped");
    Ok(())
}

/// Wait for a concurrency slot; `None` when shutdown is signalled first
async fn acquire_slot<F>(
    semaphore: &Arc<Semaphore>,
    shutdown: Pin<&mut F>,
) -> Result<Option<OwnedSemaphorePermit>>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        () = shutdown => Ok(None),
        permit = Arc::clone(semaphore).acquire_owned() => {
            permit.map(Some).context("Reconciliation semaphore closed")
        }
    }
}

/// Spawn a reconciliation holding `permit` until it finishes
fn dispatch(permit: OwnedSemaphorePermit, reconciler: &Arc<Reconciler>, name: String) {
    debug!("Dispatching reconciliation for AzPermission {}", name);
    let reconciler = Arc::clone(reconciler);
    tokio::spawn(async move {
        let _permit = permit;
        reconciler.reconcile(&name).await;
    });
}

/// Wait for running reconciliations, bounded by one reconcile deadline plus a margin
async fn drain(semaphore: &Semaphore, max_concurrent: usize, deadline: Duration) {
    let permits = u32::try_from(max_concurrent).unwrap_or(u32::MAX);
    let wait = deadline.saturating_add(Duration::from_secs(5));
    if tokio::time::timeout(wait, semaphore.acquire_many(permits))
        .await
        .is_err()
    {
        warn!("Reconciliations still running after {:?}, exiting anyway", wait);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AzPermissionSpec, AzPermissionStatus};

    fn permission(name: &str, uid: &str) -> AzPermission {
        let mut obj = AzPermission::new(
            name,
            AzPermissionSpec {
                resource_path: "/subscriptions/x/resourceGroups/rg".to_string(),
            },
        );
        obj.metadata.uid = Some(uid.to_string());
        obj
    }

    fn kind(tracker: &mut EventTracker, event: Event<AzPermission>) -> Option<EventKind> {
        tracker.classify(event).map(|(kind, _)| kind)
    }

    #[test]
    fn test_first_sighting_is_create_then_update() {
        let mut tracker = EventTracker::new();
        assert_eq!(
            kind(&mut tracker, Event::Apply(permission("a", "uid-a"))),
            Some(EventKind::Create)
        );
        let mut updated = permission("a", "uid-a");
        updated.status = Some(AzPermissionStatus::pending());
        assert_eq!(kind(&mut tracker, Event::Apply(updated)), Some(EventKind::Update));
    }

    #[test]
    fn test_delete_then_recreate_with_same_name_is_create() {
        let mut tracker = EventTracker::new();
        kind(&mut tracker, Event::Apply(permission("a", "uid-1")));
        assert_eq!(
            kind(&mut tracker, Event::Delete(permission("a", "uid-1"))),
            Some(EventKind::Delete)
        );
        assert_eq!(
            kind(&mut tracker, Event::Apply(permission("a", "uid-2"))),
            Some(EventKind::Create)
        );
    }

    #[test]
    fn test_relist_reports_only_unseen_objects_as_create() {
        let mut tracker = EventTracker::new();
        kind(&mut tracker, Event::Apply(permission("a", "uid-a")));
        kind(&mut tracker, Event::Apply(permission("gone", "uid-gone")));

        assert_eq!(kind(&mut tracker, Event::Init), None);
        assert_eq!(
            kind(&mut tracker, Event::InitApply(permission("a", "uid-a"))),
            Some(EventKind::Generic)
        );
        assert_eq!(
            kind(&mut tracker, Event::InitApply(permission("b", "uid-b"))),
            Some(EventKind::Create)
        );
        assert_eq!(kind(&mut tracker, Event::InitDone), None);

        // objects missing from the re-list are forgotten
        assert_eq!(
            kind(&mut tracker, Event::Apply(permission("gone", "uid-gone"))),
            Some(EventKind::Create)
        );
        assert_eq!(
            kind(&mut tracker, Event::Apply(permission("b", "uid-b"))),
            Some(EventKind::Update)
        );
    }

    #[tokio::test]
    async fn test_acquire_slot_returns_on_shutdown_when_saturated() {
        let semaphore = Arc::new(Semaphore::new(1));
        let _busy = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let shutdown = std::future::ready(());
        tokio::pin!(shutdown);

        let slot = tokio::time::timeout(
            Duration::from_secs(1),
            acquire_slot(&semaphore, shutdown.as_mut()),
        )
        .await
        .expect("shutdown should interrupt the wait");
        assert!(slot.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_slot_takes_free_permit() {
        let semaphore = Arc::new(Semaphore::new(2));
        let shutdown = std::future::pending::<()>();
        tokio::pin!(shutdown);

        let permit = acquire_slot(&semaphore, shutdown.as_mut()).await.unwrap();
        assert!(permit.is_some());
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[test]
    fn test_initial_list_creates_pass_predicate() {
        let mut tracker = EventTracker::new();
        kind(&mut tracker, Event::Init);
        let (event_kind, obj) = tracker
            .classify(Event::InitApply(permission("a", "uid-a")))
            .unwrap();
        assert!(on_creation(event_kind, &obj));
    }
}
