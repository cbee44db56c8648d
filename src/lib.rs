//! # Azure Permissions Checker
//!
//! A Kubernetes controller that reports the Azure RBAC permissions of the
//! cluster's Azure identity on a resource or resource group.
//!
//! ## Overview
//!
//! 1. **Request** - a user (or `azcheckperms`) creates a cluster-scoped `AzPermission`
//!    naming a resource path
//! 2. **Claim** - the controller marks it `Pending` with a conditional write, so only
//!    one reconciliation handles each request
//! 3. **List** - the permissions of the configured principal are listed from the
//!    Azure authorization API, following every page
//! 4. **Answer** - the request ends `Ready` with the allowed and denied actions, or
//!    `Failed` with an error kind and message
//!
//! Requests are answered once; later changes to the object are ignored.

pub mod check;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod store;
