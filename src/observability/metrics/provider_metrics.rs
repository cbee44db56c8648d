//! # Provider Metrics
//!
//! Metrics for Azure authorization API calls.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static AZURE_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "azpermissions_azure_requests_total",
            "Total number of Azure authorization API page requests",
        ),
        &["scope"],
    )
    .expect("Failed to create AZURE_REQUESTS_TOTAL metric - this should never happen")
});

static AZURE_REQUEST_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "azpermissions_azure_request_errors_total",
            "Total number of failed Azure authorization API requests by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create AZURE_REQUEST_ERRORS_TOTAL metric - this should never happen")
});

/// Register provider metrics with the registry
pub(crate) fn register_provider_metrics() -> Result<()> {
    REGISTRY.register(Box::new(AZURE_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AZURE_REQUEST_ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Count one page request; `scope` is `resourceGroup` or `resource`
pub fn increment_azure_requests(scope: &str) {
    AZURE_REQUESTS_TOTAL.with_label_values(&[scope]).inc();
}

/// Count one failed request by error kind tag
pub fn increment_azure_request_errors(kind: &str) {
    AZURE_REQUEST_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}
