//! # Permission Check Error Types
//!
//! Errors that end a permissions request in the Failed state, classified by
//! kind. The kind tag is written to `status.state_reason`; the display string
//! is written to `status.state_message`.

use thiserror::Error;

/// Error that ends a permissions request
#[derive(Debug, Error)]
pub enum PermissionsError {
    /// The resource path matches neither the resource nor the resource group grammar
    #[error("the resource path {0:?} is invalid")]
    InvalidResourcePath(String),

    /// No access token could be obtained for Azure Resource Manager
    #[error("failed to acquire Azure access token: {0}")]
    Authentication(String),

    /// The request never produced an HTTP response
    #[error("failed to call Azure authorization API: {0}")]
    Transport(String),

    /// Azure Resource Manager rejected the request because of rate limiting
    #[error("Azure authorization API throttled the request (HTTP 429): {message}")]
    Throttled { message: String },

    /// Azure Resource Manager answered with a non-success status
    #[error("Azure authorization API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded
    #[error("failed to decode Azure authorization API response: {0}")]
    Decode(String),
}

impl PermissionsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermissionsError::InvalidResourcePath(_) => ErrorKind::InvalidResourcePath,
            PermissionsError::Authentication(_) => ErrorKind::Authentication,
            PermissionsError::Transport(_) => ErrorKind::Transport,
            PermissionsError::Throttled { .. } => ErrorKind::Throttled,
            PermissionsError::Api { .. } => ErrorKind::Api,
            PermissionsError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Classification of permission check failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidResourcePath,
    Authentication,
    Transport,
    Throttled,
    Api,
    Decode,
}

impl ErrorKind {
    /// Stable tag written to `status.state_reason` and used as a metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidResourcePath => "invalidResourcePathErr",
            ErrorKind::Authentication => "authenticationErr",
            ErrorKind::Transport => "transportErr",
            ErrorKind::Throttled => "throttledErr",
            ErrorKind::Api => "apiErr",
            ErrorKind::Decode => "decodeErr",
        }
    }
}
