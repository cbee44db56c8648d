//! # Azure Provider
//!
//! Lists Azure RBAC permissions through the Azure Resource Manager
//! authorization API, authenticating as the cluster identity described by the
//! Azure cloud provider configuration.

pub mod auth;
pub mod cloud_config;
pub mod permissions;
mod types;

pub use cloud_config::{load_cloud_config, AzureCloudConfig, AzureIdentity, CloudConfigError};
pub use permissions::AzurePermissionsClient;

use anyhow::{Context, Result};
use tracing::info;

/// Build the permissions client for the identity in `config`
///
/// `endpoint_override` replaces the Resource Manager endpoint derived from the
/// cloud config.
pub fn create_permissions_client(
    config: &AzureCloudConfig,
    endpoint_override: Option<&str>,
) -> Result<AzurePermissionsClient> {
    let identity = config
        .identity()
        .context("Azure cloud config does not describe a usable identity")?;
    let credential = auth::create_credential(&identity)?;

    let endpoint = endpoint_override
        .filter(|e| !e.trim().is_empty())
        .map_or_else(|| config.resource_manager_endpoint(), str::to_string);
    info!(
        "Azure Resource Manager endpoint: {}, subscription: {}",
        endpoint, config.subscription_id
    );

    AzurePermissionsClient::new(&endpoint, &config.subscription_id, credential)
}
