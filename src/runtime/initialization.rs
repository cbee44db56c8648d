//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, HTTP server, Kubernetes
//! client, Azure cloud config and credential, and the reconciler.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::AzPermission;
use crate::observability;
use crate::provider::azure::{create_permissions_client, load_cloud_config};
use crate::store::KubePermissionStore;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the cluster-scoped AzPermission CRD
    pub permissions: Api<AzPermission>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "azure_permissions_checker=info".into()),
        )
        .init();

    info!("Starting Azure Permissions Checker");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (controller_config, server_config) = crate::config::load_config();
    info!("Controller configuration: {:?}", controller_config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    // Start HTTP server for metrics and probes and wait for it to bind
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let cloud_config = load_cloud_config(
        &client,
        &controller_config.cloud_config_secret_name,
        &controller_config.cloud_config_secret_namespace,
    )
    .await
    .context("Failed to load Azure cloud config")?;
    info!("Azure cloud config: {:?}", cloud_config);

    let lister = create_permissions_client(
        &cloud_config,
        controller_config.resource_manager_endpoint.as_deref(),
    )?;

    let permissions: Api<AzPermission> = Api::all(client.clone());
    check_crd_installed(&permissions).await;

    let reconciler = Arc::new(
        Reconciler::new(
            Arc::new(KubePermissionStore::new(client.clone())),
            Arc::new(lister),
            cloud_config.client_id(),
        )
        .with_retry(controller_config.status_update_retry())
        .with_list_timeout(controller_config.reconcile_timeout()),
    );
    info!(
        "Checking permissions for principal {}",
        reconciler.client_id()
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        permissions,
        reconciler,
        server_state,
        controller_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log whether the CRD is installed; the watch keeps retrying either way
async fn check_crd_installed(permissions: &Api<AzPermission>) {
    match permissions.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("AzPermission CRD is queryable"),
        Err(e) => {
            error!("AzPermission CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD check failure - the watch will retry");
        }
    }
}
