//! # Permission Providers
//!
//! The reconciler asks a [`PermissionLister`] for the permissions of the
//! configured principal. Results arrive as a lazy stream of pages; the stream
//! ends after the first error.

pub mod azure;

use crate::controller::error::PermissionsError;
use crate::controller::resource_path::ResourceRef;
use futures::stream::BoxStream;

/// One page of allowed and denied actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionPage {
    pub allowed_actions: Vec<String>,
    pub denied_actions: Vec<String>,
}

/// Lazy sequence of permission pages
///
/// Not restartable: list again to start over.
pub type PermissionPages<'a> = BoxStream<'a, Result<PermissionPage, PermissionsError>>;

/// Lists permissions of the configured principal
pub trait PermissionLister: Send + Sync {
    fn list_for_resource_group<'a>(&'a self, group: &'a str) -> PermissionPages<'a>;

    fn list_for_resource<'a>(&'a self, resource: &'a ResourceRef) -> PermissionPages<'a>;
}
