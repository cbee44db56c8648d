//! # Azure Authorization API Types
//!
//! Response types for `Microsoft.Authorization/permissions` (api-version 2015-07-01).

use serde::Deserialize;

/// One page of the permissions listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionListResult {
    pub value: Vec<Permission>,
    /// Absolute URL of the next page, absent on the last page
    pub next_link: Option<String>,
}

/// Actions granted (`actions`) and excluded (`notActions`) by one role assignment
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permission {
    pub actions: Vec<String>,
    pub not_actions: Vec<String>,
}

/// ARM error envelope
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
