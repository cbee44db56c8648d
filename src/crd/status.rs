//! # AzPermission Status
//!
//! Status types written by the reconciler.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a permissions request
///
/// Pending is the only non-terminal state. Ready and Failed are never
/// overwritten once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum AzPermissionState {
    /// Claimed by a reconciliation, permissions not yet written
    Pending,
    /// Permissions listed successfully
    Ready,
    /// Listing failed; see `state_reason` and `state_message`
    Failed,
}

impl AzPermissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AzPermissionState::Ready | AzPermissionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AzPermissionState::Pending => "Pending",
            AzPermissionState::Ready => "Ready",
            AzPermissionState::Failed => "Failed",
        }
    }
}

impl fmt::Display for AzPermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the AzPermission resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AzPermissionStatus {
    /// Current state: Pending, Ready or Failed
    pub state: AzPermissionState,
    /// Error kind tag when Failed (e.g. "invalidResourcePathErr")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<String>,
    /// Human-readable error when Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_message: Option<String>,
    /// Client ID of the Azure principal the permissions were evaluated for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Allowed actions, present (possibly empty) once Ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Denied actions (notActions), present (possibly empty) once Ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied: Option<Vec<String>>,
}

impl AzPermissionStatus {
    /// Status written when a reconciliation claims the request
    pub fn pending() -> Self {
        Self {
            state: AzPermissionState::Pending,
            state_reason: None,
            state_message: None,
            principal: None,
            allowed: None,
            denied: None,
        }
    }
}
