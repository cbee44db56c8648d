//! # Azure Cloud Configuration
//!
//! Resolves the Azure identity the controller acts as. The configuration is the
//! same document the Azure cloud provider uses (`azure.json`), read from:
//!
//! 1. the Kubernetes secret `kube-system/azure-cloud-provider`, key `cloud-config`
//! 2. the file named by `AZURE_CREDENTIAL_FILE`, defaulting to
//!    `/etc/kubernetes/azure.json` (or `C:\k\azure.json` on Windows)
//!
//! Any failure here is fatal at startup.

use crate::constants::{
    AZURE_CREDENTIAL_FILE_ENV, CLOUD_CONFIG_SECRET_KEY, DEFAULT_CRED_FILE_PATH_LINUX,
    DEFAULT_CRED_FILE_PATH_WINDOWS, DEFAULT_RESOURCE_MANAGER_ENDPOINT,
};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Client ID placeholder the cloud provider uses for system-assigned managed identity
const MSI_CLIENT_ID: &str = "msi";

#[derive(Debug, Error)]
pub enum CloudConfigError {
    #[error("failed to load cloud config from file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse cloud config from {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("invalid cloud config: {0}")]
    Invalid(String),
}

/// Subset of the Azure cloud provider configuration used by the controller
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureCloudConfig {
    /// Cloud name, e.g. AzurePublicCloud
    pub cloud: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub aad_client_id: String,
    pub aad_client_secret: String,
    pub use_managed_identity_extension: bool,
    #[serde(rename = "userAssignedIdentityID")]
    pub user_assigned_identity_id: String,
    pub use_federated_workload_identity_extension: bool,
    pub aad_federated_token_file: String,
    pub resource_manager_endpoint: String,
}

impl std::fmt::Debug for AzureCloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCloudConfig")
            .field("cloud", &self.cloud)
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("aad_client_id", &self.aad_client_id)
            .field("use_managed_identity_extension", &self.use_managed_identity_extension)
            .field(
                "use_federated_workload_identity_extension",
                &self.use_federated_workload_identity_extension,
            )
            .finish_non_exhaustive()
    }
}

/// How the controller authenticates to Azure
#[derive(Clone, PartialEq, Eq)]
pub enum AzureIdentity {
    /// Service principal with a client secret
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Federated token exchanged through Azure Workload Identity
    WorkloadIdentity {
        tenant_id: String,
        client_id: String,
        token_file: Option<String>,
    },
    /// Node managed identity; `None` selects the system-assigned identity
    ManagedIdentity { client_id: Option<String> },
}

impl std::fmt::Debug for AzureIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AzureIdentity::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            AzureIdentity::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file,
            } => f
                .debug_struct("WorkloadIdentity")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("token_file", token_file)
                .finish(),
            AzureIdentity::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

impl AzureCloudConfig {
    /// Parse an `azure.json` document (JSON or YAML)
    pub fn parse(bytes: &[u8], origin: &str) -> Result<Self, CloudConfigError> {
        let config: Self = serde_yaml::from_slice(bytes).map_err(|e| CloudConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CloudConfigError> {
        if self.subscription_id.trim().is_empty() {
            return Err(CloudConfigError::Invalid(
                "subscriptionId must be set".to_string(),
            ));
        }
        if self.identity().is_none() {
            return Err(CloudConfigError::Invalid(
                "no usable identity: set aadClientId/aadClientSecret, useManagedIdentityExtension or useFederatedWorkloadIdentityExtension".to_string(),
            ));
        }
        Ok(())
    }

    /// Client ID of the principal permissions are evaluated for
    pub fn client_id(&self) -> String {
        if !self.aad_client_id.is_empty() && self.aad_client_id != MSI_CLIENT_ID {
            self.aad_client_id.clone()
        } else if !self.user_assigned_identity_id.is_empty() {
            self.user_assigned_identity_id.clone()
        } else {
            self.aad_client_id.clone()
        }
    }

    /// Select the authentication method, in the cloud provider's order of precedence
    pub fn identity(&self) -> Option<AzureIdentity> {
        if self.use_federated_workload_identity_extension {
            let client_id = self.client_id();
            if client_id.is_empty() || self.tenant_id.is_empty() {
                return None;
            }
            return Some(AzureIdentity::WorkloadIdentity {
                tenant_id: self.tenant_id.clone(),
                client_id,
                token_file: (!self.aad_federated_token_file.is_empty())
                    .then(|| self.aad_federated_token_file.clone()),
            });
        }

        if self.use_managed_identity_extension {
            return Some(AzureIdentity::ManagedIdentity {
                client_id: (!self.user_assigned_identity_id.is_empty())
                    .then(|| self.user_assigned_identity_id.clone()),
            });
        }

        if !self.aad_client_id.is_empty()
            && !self.aad_client_secret.is_empty()
            && !self.tenant_id.is_empty()
        {
            return Some(AzureIdentity::ClientSecret {
                tenant_id: self.tenant_id.clone(),
                client_id: self.aad_client_id.clone(),
                client_secret: self.aad_client_secret.clone(),
            });
        }

        None
    }

    /// Azure Resource Manager endpoint for the configured cloud, without trailing slash
    pub fn resource_manager_endpoint(&self) -> String {
        let endpoint = if self.resource_manager_endpoint.is_empty() {
            match self.cloud.to_ascii_lowercase().as_str() {
                "azurechinacloud" => "https://management.chinacloudapi.cn",
                "azureusgovernmentcloud" => "https://management.usgovcloudapi.net",
                _ => DEFAULT_RESOURCE_MANAGER_ENDPOINT,
            }
        } else {
            self.resource_manager_endpoint.as_str()
        };
        endpoint.trim_end_matches('/').to_string()
    }
}

/// Default cloud config file for the current OS
pub fn default_credential_file() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(DEFAULT_CRED_FILE_PATH_WINDOWS)
    } else {
        PathBuf::from(DEFAULT_CRED_FILE_PATH_LINUX)
    }
}

/// Cloud config file path, honoring `AZURE_CREDENTIAL_FILE`
pub fn credential_file_path() -> PathBuf {
    match std::env::var(AZURE_CREDENTIAL_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            debug!("{} env var set as {}", AZURE_CREDENTIAL_FILE_ENV, path);
            PathBuf::from(path.trim())
        }
        _ => {
            let path = default_credential_file();
            debug!(
                "{} not set, using default {}",
                AZURE_CREDENTIAL_FILE_ENV,
                path.display()
            );
            path
        }
    }
}

/// Load the cloud config from disk
pub async fn load_from_file(path: &Path) -> Result<AzureCloudConfig, CloudConfigError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CloudConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    AzureCloudConfig::parse(&bytes, &path.display().to_string())
}

/// Load the cloud config from the secret, returning `None` when the secret
/// is missing or unusable so the caller can fall back to the file
async fn load_from_secret(
    client: &Client,
    secret_name: &str,
    secret_namespace: &str,
) -> Option<AzureCloudConfig> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), secret_namespace);
    let secret = match secrets.get(secret_name).await {
        Ok(secret) => secret,
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            debug!(
                "cloud config secret {}/{} not found",
                secret_namespace, secret_name
            );
            return None;
        }
        Err(e) => {
            warn!(
                "failed to read cloud config secret {}/{}: {}",
                secret_namespace, secret_name, e
            );
            return None;
        }
    };

    let Some(data) = secret
        .data
        .as_ref()
        .and_then(|data| data.get(CLOUD_CONFIG_SECRET_KEY))
    else {
        warn!(
            "cloud config secret {}/{} has no {} key",
            secret_namespace, secret_name, CLOUD_CONFIG_SECRET_KEY
        );
        return None;
    };

    let origin = format!("secret {secret_namespace}/{secret_name}");
    match AzureCloudConfig::parse(&data.0, &origin) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("failed to create cloud config from {}: {}", origin, e);
            None
        }
    }
}

/// Resolve the cloud config: secret first, file on disk second
pub async fn load_cloud_config(
    client: &Client,
    secret_name: &str,
    secret_namespace: &str,
) -> Result<AzureCloudConfig, CloudConfigError> {
    if let Some(config) = load_from_secret(client, secret_name, secret_namespace).await {
        info!(
            "Loaded Azure cloud config from secret {}/{}",
            secret_namespace, secret_name
        );
        return Ok(config);
    }

    let path = credential_file_path();
    let config = load_from_file(&path).await?;
    info!("Loaded Azure cloud config from file {}", path.display());
    Ok(config)
}
