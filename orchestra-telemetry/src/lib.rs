//! Telemetry initialization for orchestra services.
//!
//! Sets up structured logging through `tracing`: JSON logs to rolling files
//! in production, pretty console output in development, with a panic hook
//! that routes panics through the logging pipeline.

pub mod tracing;
