//! # Permission Request Store
//!
//! Narrow interface over the shared, versioned object store that holds
//! `AzPermission` requests. Writes are optimistic: `update_status` fails with
//! [`StoreError::Conflict`] when the object changed since it was read.

mod kubernetes;

pub use kubernetes::KubePermissionStore;

use crate::crd::AzPermission;
use async_trait::async_trait;
use thiserror::Error;

/// Store operation failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("AzPermission {0} not found")]
    NotFound(String),

    /// The stored resource version differs from the one the caller read
    #[error("AzPermission {0} was modified concurrently")]
    Conflict(String),

    #[error("object store request failed: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Get and conditional status-update operations on `AzPermission` objects
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fetch the current version of the named object
    async fn get(&self, name: &str) -> Result<AzPermission, StoreError>;

    /// Write `permission.status`, guarded by `permission.metadata.resource_version`
    ///
    /// Returns the stored object (with its new resource version) on success.
    async fn update_status(&self, permission: &AzPermission) -> Result<AzPermission, StoreError>;
}
