//! # CRD Generator
//!
//! Prints the `AzPermission` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/azpermission.yaml
//! ```

use anyhow::{Context, Result};
use azure_permissions_checker::crd::AzPermission;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&AzPermission::crd()).context("Failed to serialize CRD")?;
    print!("{crd}");
    Ok(())
}
