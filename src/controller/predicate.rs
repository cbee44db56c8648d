//! # Event Predicate
//!
//! Decides which watch events trigger a reconciliation. Only the creation of
//! an object the controller has never touched does.

use crate::crd::AzPermission;

/// Kind of change observed on an `AzPermission`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Generic,
}

/// True only for a creation event of an object without status
pub fn on_creation(kind: EventKind, permission: &AzPermission) -> bool {
    kind == EventKind::Create && permission.status.is_none()
}
