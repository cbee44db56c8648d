//! In-memory collaborators for reconciler and client tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of the fakes")]

use async_trait::async_trait;
use azure_permissions_checker::controller::error::PermissionsError;
use azure_permissions_checker::controller::resource_path::ResourceRef;
use azure_permissions_checker::crd::{AzPermission, AzPermissionSpec, AzPermissionStatus};
use azure_permissions_checker::provider::{PermissionLister, PermissionPage, PermissionPages};
use azure_permissions_checker::store::{PermissionStore, StoreError};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const SUBSCRIPTION: &str = "01234567-89ab-cdef-fedc-ba9876543210";
pub const CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";

pub fn rg_path(group: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{group}")
}

pub fn request(name: &str, resource_path: &str) -> AzPermission {
    AzPermission::new(
        name,
        AzPermissionSpec {
            resource_path: resource_path.to_string(),
        },
    )
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Injected behaviour for the next `update_status` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Another writer changes the object first; the call conflicts
    Conflict,
    /// Another writer claims the object (status Pending) first; the call conflicts
    ConcurrentClaim,
    /// The call fails with a non-conflict error
    Error,
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<String, AzPermission>,
    next_version: u64,
    faults: VecDeque<Option<WriteFault>>,
    get_error: Option<String>,
    update_calls: usize,
    writes: Vec<AzPermissionStatus>,
}

impl StoreState {
    fn bump(&mut self, name: &str) {
        self.next_version += 1;
        let version = self.next_version.to_string();
        if let Some(obj) = self.objects.get_mut(name) {
            obj.metadata.resource_version = Some(version);
        }
    }
}

/// Versioned in-memory object store
///
/// `update_status` succeeds only when the caller's resource version matches
/// the stored one.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `obj`, replacing any object with the same name; a missing UID is
    /// generated, so a re-insert under the same name acts as a recreation
    pub fn insert(&self, mut obj: AzPermission) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        obj.metadata.resource_version = Some(state.next_version.to_string());
        if obj.metadata.uid.is_none() {
            obj.metadata.uid = Some(format!("uid-{}", state.next_version));
        }
        let name = obj.metadata.name.clone().unwrap();
        state.objects.insert(name, obj);
    }

    /// Queue per-call behaviour for `update_status`; `None` lets a call through
    pub fn push_faults(&self, faults: impl IntoIterator<Item = Option<WriteFault>>) {
        self.state.lock().unwrap().faults.extend(faults);
    }

    /// Make every `get` fail
    pub fn fail_gets(&self, message: &str) {
        self.state.lock().unwrap().get_error = Some(message.to_string());
    }

    pub fn object(&self, name: &str) -> Option<AzPermission> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Option<AzPermissionStatus> {
        self.object(name).and_then(|obj| obj.status)
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    /// Statuses written successfully, in order
    pub fn writes(&self) -> Vec<AzPermissionStatus> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Set a status directly, as another actor would
    pub fn set_status(&self, name: &str, status: AzPermissionStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(obj) = state.objects.get_mut(name) {
            obj.status = Some(status);
        }
        state.bump(name);
    }
}

#[async_trait]
impl PermissionStore for FakeStore {
    async fn get(&self, name: &str) -> Result<AzPermission, StoreError> {
        // Let concurrent reconciliations interleave between reads and writes
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.get_error {
            return Err(StoreError::Other(message.clone()));
        }
        state
            .objects
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn update_status(&self, permission: &AzPermission) -> Result<AzPermission, StoreError> {
        tokio::task::yield_now().await;
        let name = permission.metadata.name.clone().unwrap();
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;

        match state.faults.pop_front().flatten() {
            Some(WriteFault::Conflict) => state.bump(&name),
            Some(WriteFault::ConcurrentClaim) => {
                if let Some(obj) = state.objects.get_mut(&name) {
                    obj.status = Some(AzPermissionStatus::pending());
                }
                state.bump(&name);
            }
            Some(WriteFault::Error) => {
                return Err(StoreError::Other("injected store failure".to_string()));
            }
            None => {}
        }

        let stored_version = match state.objects.get(&name) {
            Some(obj) => obj.metadata.resource_version.clone(),
            None => return Err(StoreError::NotFound(name)),
        };
        if stored_version != permission.metadata.resource_version {
            return Err(StoreError::Conflict(name));
        }

        state.next_version += 1;
        let version = state.next_version.to_string();
        let obj = state.objects.get_mut(&name).unwrap();
        obj.status.clone_from(&permission.status);
        obj.metadata.resource_version = Some(version);
        let updated = obj.clone();
        if let Some(status) = updated.status.clone() {
            state.writes.push(status);
        }
        Ok(updated)
    }
}

/// One scripted element of a permissions listing
#[derive(Debug, Clone)]
pub enum PageScript {
    Page { allowed: Vec<String>, denied: Vec<String> },
    Throttled(String),
    Api(u16, String),
}

impl PageScript {
    pub fn page(allowed: &[&str], denied: &[&str]) -> Self {
        PageScript::Page {
            allowed: strings(allowed),
            denied: strings(denied),
        }
    }

    fn materialize(&self) -> Result<PermissionPage, PermissionsError> {
        match self {
            PageScript::Page { allowed, denied } => Ok(PermissionPage {
                allowed_actions: allowed.clone(),
                denied_actions: denied.clone(),
            }),
            PageScript::Throttled(message) => Err(PermissionsError::Throttled {
                message: message.clone(),
            }),
            PageScript::Api(status, message) => Err(PermissionsError::Api {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

type ListHook = Box<dyn Fn() + Send + Sync>;

/// Lister that replays a script and records what was asked
#[derive(Default)]
pub struct FakeLister {
    script: Vec<PageScript>,
    /// Never yield anything
    hang: bool,
    /// Runs when a listing starts, after the claim
    on_list: Option<ListHook>,
    calls: Mutex<Vec<String>>,
}

impl FakeLister {
    pub fn new(script: Vec<PageScript>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Run `hook` whenever a listing starts
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_list = Some(Box::new(hook));
        self
    }

    /// Recorded calls: `group:<name>` or `resource:<provider>/<parent>/<type>/<name>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn replay(&self) -> PermissionPages<'_> {
        if let Some(hook) = &self.on_list {
            hook();
        }
        if self.hang {
            return stream::pending().boxed();
        }
        let items: Vec<_> = self.script.iter().map(PageScript::materialize).collect();
        stream::iter(items).boxed()
    }
}

impl PermissionLister for FakeLister {
    fn list_for_resource_group<'a>(&'a self, group: &'a str) -> PermissionPages<'a> {
        self.calls.lock().unwrap().push(format!("group:{group}"));
        self.replay()
    }

    fn list_for_resource<'a>(&'a self, resource: &'a ResourceRef) -> PermissionPages<'a> {
        self.calls.lock().unwrap().push(format!(
            "resource:{}/{}/{}/{}",
            resource.provider, resource.parent_path, resource.resource_type, resource.resource_name
        ));
        self.replay()
    }
}
