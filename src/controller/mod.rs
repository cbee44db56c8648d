//! # Controller
//!
//! Core controller logic: resource path parsing, the creation predicate, the
//! reconciler state machine and the HTTP server for metrics and probes.

pub mod backoff;
pub mod error;
pub mod predicate;
pub mod reconciler;
pub mod resource_path;
pub mod server;
