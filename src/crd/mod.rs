//! # Custom Resource Definitions
//!
//! CRD types for the Azure Permissions Checker.
//!
//! `AzPermission` is a cluster-scoped request object: the caller fills in
//! `spec.resource_path`, the controller answers in `status`.

mod status;

pub use status::{AzPermissionState, AzPermissionStatus};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// AzPermission Custom Resource Definition
///
/// Checks resource and resource group access permissions for the principal
/// configured for the Azure cloud provider.
///
/// # Example
///
/// ```yaml
/// apiVersion: permissions.azure.com/v1alpha1
/// kind: AzPermission
/// metadata:
///   name: rg-test
/// spec:
///   resource_path: /subscriptions/01234567-89ab-cdef-fedc-ba9876543210/resourceGroups/test-rg
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AzPermission",
    group = "permissions.azure.com",
    version = "v1alpha1",
    status = "AzPermissionStatus",
    shortname = "azperm",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Principal", "type":"string", "jsonPath":".status.principal"}, {"name":"Resource", "type":"string", "jsonPath":".spec.resource_path", "priority": 1}"#
)]
pub struct AzPermissionSpec {
    /// Azure Resource Manager ID of a resource or resource group
    /// Examples:
    /// - /subscriptions/{id}/resourceGroups/{group}
    /// - /subscriptions/{id}/resourceGroups/{group}/providers/Microsoft.Compute/disks/{name}
    #[serde(default)]
    pub resource_path: String,
}

impl AzPermission {
    /// State recorded in the status, if the controller has touched the object
    pub fn state(&self) -> Option<AzPermissionState> {
        self.status.as_ref().map(|status| status.state)
    }

    /// True once the controller has written Ready or Failed
    pub fn is_terminal(&self) -> bool {
        self.state().is_some_and(AzPermissionState::is_terminal)
    }
}
