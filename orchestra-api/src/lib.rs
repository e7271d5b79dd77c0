//! Control-plane API for an orchestra cluster.
//!
//! Exposes a REST surface for cluster-level control operations: triggering
//! updates and restarts through short-lived control pods, listing images to
//! pre-pull on nodes, and reading or mutating cluster settings. Includes
//! Kubernetes integration, structured logging, and OpenAPI documentation.

pub mod config;
pub mod k8s;
pub mod manifest;
pub mod routes;
pub mod settings;
pub mod startup;
