//! # azcheckperms
//!
//! Asks the controller which Azure permissions the cluster identity has on a
//! resource or resource group.
//!
//! ## Usage
//!
//! ```bash
//! azcheckperms /subscriptions/<sub>/resourceGroups/my-rg
//! azcheckperms --timeout 5m --context prod \
//!     /subscriptions/<sub>/resourceGroups/my-rg/providers/Microsoft.Network/virtualNetworks/vnet
//! ```
//!
//! A `permcheck-<uuid>` AzPermission is created, polled until the controller
//! writes a terminal state, printed and deleted again.

use anyhow::{Context, Result};
use azure_permissions_checker::check::{
    new_request, parse_duration, poll_until_terminal, render_report,
};
use azure_permissions_checker::crd::AzPermission;
use azure_permissions_checker::store::KubePermissionStore;
use clap::Parser;
use kube::api::{Api, DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Time allowed for deleting the request after the check finished
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Check the Azure permissions of the cluster identity
#[derive(Parser, Debug)]
#[command(name = "azcheckperms")]
#[command(version, about = "Check the Azure RBAC permissions of the cluster identity", long_about = None)]
struct Cli {
    /// Resource group or resource ID, e.g. /subscriptions/<id>/resourceGroups/<group>
    #[arg(value_name = "RESOURCE_PATH")]
    resource_path: String,

    /// Path to the kubeconfig file (defaults to $KUBECONFIG, ~/.kube/config, then in-cluster)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes context to use
    #[arg(long)]
    context: Option<String>,

    /// Permissions check timeout
    #[arg(long, default_value = "2m", value_parser = parse_duration)]
    timeout: Duration,

    /// Interval between status polls
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    poll_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider was already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "azcheckperms=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let client = kube_client(cli.kubeconfig.as_ref(), cli.context.clone()).await?;
    let api: Api<AzPermission> = Api::all(client.clone());
    let store = KubePermissionStore::new(client);

    let request = tokio::time::timeout(
        cli.timeout,
        api.create(&PostParams::default(), &new_request(&cli.resource_path)),
    )
    .await
    .context("Timed out creating permissions request")?
    .context("Failed to create permissions request")?;
    let name = request
        .metadata
        .name
        .clone()
        .context("Created permissions request has no name")?;
    debug!("Created AzPermission {}", name);

    let result = poll_until_terminal(&store, &name, cli.poll_interval, cli.timeout).await;

    match tokio::time::timeout(CLEANUP_TIMEOUT, api.delete(&name, &DeleteParams::default())).await
    {
        Ok(Ok(_)) => debug!("Deleted AzPermission {}", name),
        Ok(Err(e)) => warn!("Failed to delete AzPermission {}: {}", name, e),
        Err(_) => warn!("Timed out deleting AzPermission {}", name),
    }

    let permission = result?;
    print!("{}", render_report(&permission)?);
    Ok(())
}

/// Build the Kubernetes client from an explicit kubeconfig, a context, or inference
async fn kube_client(kubeconfig: Option<&PathBuf>, context: Option<String>) -> Result<Client> {
    let options = KubeConfigOptions {
        context,
        ..KubeConfigOptions::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .context("Failed to load kubeconfig")?
        }
        None if options.context.is_some() => Config::from_kubeconfig(&options)
            .await
            .context("Failed to load kubeconfig")?,
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    Client::try_from(config).context("Failed to create Kubernetes client")
}
