//! # Kubernetes Store
//!
//! `PermissionStore` backed by the Kubernetes API server.
//!
//! Status writes use a JSON merge patch on the status subresource that carries
//! `metadata.resourceVersion`; the API server rejects it with 409 Conflict if
//! the object changed since it was read.

use super::{PermissionStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::crd::AzPermission;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::debug;

/// Kubernetes-backed store for cluster-scoped `AzPermission` objects
#[derive(Clone)]
pub struct KubePermissionStore {
    api: Api<AzPermission>,
}

impl std::fmt::Debug for KubePermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePermissionStore").finish_non_exhaustive()
    }
}

impl KubePermissionStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

fn map_kube_error(name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(name.to_string()),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(name.to_string()),
        other => StoreError::Other(other.to_string()),
    }
}

#[async_trait]
impl PermissionStore for KubePermissionStore {
    async fn get(&self, name: &str) -> Result<AzPermission, StoreError> {
        self.api
            .get(name)
            .await
            .map_err(|e| map_kube_error(name, e))
    }

    async fn update_status(&self, permission: &AzPermission) -> Result<AzPermission, StoreError> {
        let name = permission
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| StoreError::Other("AzPermission has no name".to_string()))?;
        let resource_version = permission.metadata.resource_version.as_deref().ok_or_else(|| {
            StoreError::Other(format!("AzPermission {name} has no resourceVersion"))
        })?;

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version
            },
            "status": permission.status
        });

        debug!(
            resource.name = name,
            resource.version = resource_version,
            "patching AzPermission status"
        );

        self.api
            .patch_status(
                name,
                &PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..PatchParams::default()
                },
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| map_kube_error(name, e))
    }
}
