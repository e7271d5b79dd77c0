//! Configuration management for orchestra services.
//!
//! Provides environment detection, hierarchical configuration loading from
//! YAML files with environment variable overrides, and shared configuration
//! types used across the control plane.

mod environment;
mod load;
mod sentry;

pub use environment::*;
pub use load::*;
pub use sentry::*;
