//! # azpermissions
//!
//! Controller binary: answers `AzPermission` requests with the Azure RBAC
//! permissions of the cluster identity.
//!
//! See the [README.md](../README.md) for usage.

use anyhow::Result;
use azure_permissions_checker::runtime::initialization::initialize;
use azure_permissions_checker::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.permissions,
        init_result.reconciler,
        &init_result.controller_config,
        init_result.server_state,
    )
    .await
}
