//! # Constants
//!
//! Default values for controller configuration. Every value here can be
//! overridden through the environment (see `config`).

/// Default port for the metrics and probe HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to check whether the HTTP server is ready during startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Deadline for listing permissions within a single reconciliation (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;

/// Maximum number of reconciliations running at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 4;

/// Attempts for a conflicting status write, including the first one
pub const DEFAULT_STATUS_UPDATE_RETRY_STEPS: u32 = 4;

/// Delay before the first status write retry (milliseconds)
pub const DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS: u64 = 10;

/// Multiplier applied to the retry delay after each conflict
pub const DEFAULT_STATUS_UPDATE_RETRY_FACTOR: u32 = 5;

/// Delay before restarting the watch after an unclassified error (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Upper bound for the watch backoff used on 429 responses (milliseconds)
pub const DEFAULT_WATCH_MAX_BACKOFF_MS: u64 = 30_000;

/// Secret holding the Azure cloud provider configuration
pub const DEFAULT_CLOUD_CONFIG_SECRET_NAME: &str = "azure-cloud-provider";

/// Namespace of the Azure cloud provider configuration secret
pub const DEFAULT_CLOUD_CONFIG_SECRET_NAMESPACE: &str = "kube-system";

/// Key inside the secret that contains the cloud configuration document
pub const CLOUD_CONFIG_SECRET_KEY: &str = "cloud-config";

/// Environment variable naming the cloud configuration file on disk
pub const AZURE_CREDENTIAL_FILE_ENV: &str = "AZURE_CREDENTIAL_FILE";

/// Default cloud configuration file on Linux nodes
pub const DEFAULT_CRED_FILE_PATH_LINUX: &str = "/etc/kubernetes/azure.json";

/// Default cloud configuration file on Windows nodes
pub const DEFAULT_CRED_FILE_PATH_WINDOWS: &str = "C:\\k\\azure.json";

/// Azure public cloud Resource Manager endpoint
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";

/// API version of the Microsoft.Authorization permissions endpoints
pub const AUTHORIZATION_API_VERSION: &str = "2015-07-01";

/// Field manager name used for status writes
pub const FIELD_MANAGER: &str = "azpermissions";

/// Prefix of the request objects created by azcheckperms
pub const REQUEST_NAME_PREFIX: &str = "permcheck";
