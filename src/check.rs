//! # Permission Check Client
//!
//! Building blocks of the `azcheckperms` tool: request naming, duration
//! parsing, polling a request until the controller answers, and rendering
//! the answer.

use crate::constants::REQUEST_NAME_PREFIX;
use crate::crd::{AzPermission, AzPermissionSpec, AzPermissionState};
use crate::store::{PermissionStore, StoreError};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:ms|s|m|h))+$").expect("duration pattern is a valid regex")
});

static DURATION_PART_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h)").expect("duration part pattern is a valid regex")
});

/// Why a permission check did not produce a result
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("timed out after {0:?} waiting for the permissions check")]
    Timeout(Duration),

    #[error("failed to get permissions: {0}")]
    Poll(#[from] StoreError),

    /// The controller answered with Failed
    #[error("failed to get permissions: {message}")]
    Failed {
        reason: Option<String>,
        message: String,
    },
}

/// Parse a duration such as `2m`, `90s`, `1m30s` or `500ms`
pub fn parse_duration(duration_str: &str) -> anyhow::Result<Duration> {
    let trimmed = duration_str.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    if !DURATION_REGEX.is_match(&trimmed) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected <number><unit> segments (e.g., '2m', '1m30s', '500ms')",
            duration_str.trim()
        ));
    }

    let mut total = Duration::ZERO;
    for captures in DURATION_PART_REGEX.captures_iter(&trimmed) {
        let number: u64 = captures["number"].parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                &captures["number"],
                duration_str.trim(),
                e
            )
        })?;
        let part = match &captures["unit"] {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            _ => Duration::from_secs(number.saturating_mul(3600)),
        };
        total = total.saturating_add(part);
    }

    if total.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_str.trim()
        ));
    }
    Ok(total)
}

/// Unique name for a new request object
pub fn request_name() -> String {
    format!("{REQUEST_NAME_PREFIX}-{}", uuid::Uuid::new_v4())
}

/// New request for `resource_path`, without status
pub fn new_request(resource_path: &str) -> AzPermission {
    AzPermission::new(
        &request_name(),
        AzPermissionSpec {
            resource_path: resource_path.to_string(),
        },
    )
}

/// Poll `name` every `interval` until its state is terminal
///
/// The first poll happens immediately. A failed read ends polling.
pub async fn poll_until_terminal(
    store: &dyn PermissionStore,
    name: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<AzPermission, CheckError> {
    tokio::time::timeout(timeout, poll(store, name, interval))
        .await
        .unwrap_or(Err(CheckError::Timeout(timeout)))
}

async fn poll(
    store: &dyn PermissionStore,
    name: &str,
    interval: Duration,
) -> Result<AzPermission, CheckError> {
    loop {
        let permission = store.get(name).await?;
        if permission.is_terminal() {
            return Ok(permission);
        }
        debug!(
            "AzPermission {} state is {:?}, waiting {:?}",
            name,
            permission.state(),
            interval
        );
        tokio::time::sleep(interval).await;
    }
}

/// Render a terminal request, or the failure it carries
pub fn render_report(permission: &AzPermission) -> Result<String, CheckError> {
    let status = permission.status.as_ref();
    if permission.state() == Some(AzPermissionState::Failed) {
        return Err(CheckError::Failed {
            reason: status.and_then(|s| s.state_reason.clone()),
            message: status
                .and_then(|s| s.state_message.clone())
                .unwrap_or_default(),
        });
    }

    let principal = status.and_then(|s| s.principal.as_deref()).unwrap_or_default();
    let allowed = status.and_then(|s| s.allowed.as_deref()).unwrap_or_default();
    let denied = status.and_then(|s| s.denied.as_deref()).unwrap_or_default();

    Ok(format!(
        "\nThe principal {} has the following permissions to {} :\n\nALLOWED:\n{}\nDENIED:\n{}\n",
        principal,
        permission.spec.resource_path,
        action_lines(allowed),
        action_lines(denied),
    ))
}

/// One indented line per action
fn action_lines(actions: &[String]) -> String {
    actions.iter().map(|action| format!("   {action}\n")).collect()
}
