//! # Reconciliation Settings
//!
//! Reconciler, watch and Azure settings loaded from environment variables.

use super::{env_var_opt, env_var_or_default};
use crate::constants::{
    DEFAULT_CLOUD_CONFIG_SECRET_NAME, DEFAULT_CLOUD_CONFIG_SECRET_NAMESPACE,
    DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_STATUS_UPDATE_RETRY_FACTOR, DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS,
    DEFAULT_STATUS_UPDATE_RETRY_STEPS, DEFAULT_WATCH_MAX_BACKOFF_MS,
};
use crate::controller::backoff::RetryBackoff;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Deadline for listing permissions in one reconciliation (seconds)
    pub reconcile_timeout_secs: u64,
    /// Upper bound on reconciliations running in parallel
    pub max_concurrent_reconciles: usize,
    /// Status write attempts on conflict, including the first
    pub status_update_retry_steps: u32,
    pub status_update_retry_initial_ms: u64,
    pub status_update_retry_factor: u32,
    /// Cap for the watch restart backoff after 429 responses (milliseconds)
    pub watch_max_backoff_ms: u64,
    /// Secret holding the Azure cloud provider configuration
    pub cloud_config_secret_name: String,
    pub cloud_config_secret_namespace: String,
    /// Overrides the Resource Manager endpoint derived from the cloud config
    pub resource_manager_endpoint: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            status_update_retry_steps: DEFAULT_STATUS_UPDATE_RETRY_STEPS,
            status_update_retry_initial_ms: DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS,
            status_update_retry_factor: DEFAULT_STATUS_UPDATE_RETRY_FACTOR,
            watch_max_backoff_ms: DEFAULT_WATCH_MAX_BACKOFF_MS,
            cloud_config_secret_name: DEFAULT_CLOUD_CONFIG_SECRET_NAME.to_string(),
            cloud_config_secret_namespace: DEFAULT_CLOUD_CONFIG_SECRET_NAMESPACE.to_string(),
            resource_manager_endpoint: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            max_concurrent_reconciles: env_var_or_default(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            )
            .max(1),
            status_update_retry_steps: env_var_or_default(
                "STATUS_UPDATE_RETRY_STEPS",
                DEFAULT_STATUS_UPDATE_RETRY_STEPS,
            ),
            status_update_retry_initial_ms: env_var_or_default(
                "STATUS_UPDATE_RETRY_INITIAL_MS",
                DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS,
            ),
            status_update_retry_factor: env_var_or_default(
                "STATUS_UPDATE_RETRY_FACTOR",
                DEFAULT_STATUS_UPDATE_RETRY_FACTOR,
            ),
            watch_max_backoff_ms: env_var_or_default(
                "WATCH_MAX_BACKOFF_MS",
                DEFAULT_WATCH_MAX_BACKOFF_MS,
            ),
            cloud_config_secret_name: env_var_opt("AZURE_CLOUD_CONFIG_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_CLOUD_CONFIG_SECRET_NAME.to_string()),
            cloud_config_secret_namespace: env_var_opt("AZURE_CLOUD_CONFIG_SECRET_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_CLOUD_CONFIG_SECRET_NAMESPACE.to_string()),
            resource_manager_endpoint: env_var_opt("AZURE_RESOURCE_MANAGER_ENDPOINT"),
        }
    }

    /// Deadline for listing permissions
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Backoff applied to conflicting status writes
    pub fn status_update_retry(&self) -> RetryBackoff {
        RetryBackoff::new(
            self.status_update_retry_steps,
            Duration::from_millis(self.status_update_retry_initial_ms),
            self.status_update_retry_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_matches_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.status_update_retry(), RetryBackoff::default());
        assert_eq!(config.reconcile_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_concurrent_reconciles, 4);
    }
}
