//! # Azure Authentication
//!
//! Builds the `TokenCredential` for the identity selected by the cloud config.

use super::cloud_config::AzureIdentity;
use anyhow::{Context, Result};
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{
    ClientSecretCredential, ManagedIdentityCredential, ManagedIdentityCredentialOptions,
    UserAssignedId, WorkloadIdentityCredential, WorkloadIdentityCredentialOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Create the Azure credential for the given identity
pub fn create_credential(identity: &AzureIdentity) -> Result<Arc<dyn TokenCredential>> {
    let credential: Arc<dyn TokenCredential> = match identity {
        AzureIdentity::WorkloadIdentity {
            tenant_id,
            client_id,
            token_file,
        } => {
            info!(
                "Using Azure Workload Identity authentication with client ID: {}",
                client_id
            );
            let options = WorkloadIdentityCredentialOptions {
                client_id: Some(client_id.clone()),
                tenant_id: Some(tenant_id.clone()),
                token_file_path: token_file.as_ref().map(PathBuf::from),
                ..Default::default()
            };
            WorkloadIdentityCredential::new(Some(options))
                .context("Failed to create WorkloadIdentityCredential")?
        }
        AzureIdentity::ManagedIdentity { client_id } => {
            let options = match client_id {
                Some(client_id) => {
                    info!(
                        "Using user-assigned Managed Identity with client ID: {}",
                        client_id
                    );
                    Some(ManagedIdentityCredentialOptions {
                        user_assigned_id: Some(UserAssignedId::ClientId(client_id.clone())),
                        ..Default::default()
                    })
                }
                None => {
                    info!("Using system-assigned Managed Identity");
                    None
                }
            };
            ManagedIdentityCredential::new(options)
                .context("Failed to create ManagedIdentityCredential")?
        }
        AzureIdentity::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
        } => {
            info!(
                "Using service principal authentication with client ID: {}",
                client_id
            );
            ClientSecretCredential::new(
                tenant_id,
                client_id.clone(),
                Secret::new(client_secret.clone()),
                None,
            )
            .context("Failed to create ClientSecretCredential")?
        }
    };

    Ok(credential)
}
