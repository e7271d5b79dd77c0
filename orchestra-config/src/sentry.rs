use serde::{Deserialize, Serialize};

/// Sentry error tracking configuration.
///
/// Holds the DSN needed to initialize Sentry for error reporting in the
/// control-plane services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Sentry DSN (Data Source Name) for error reporting.
    pub dsn: String,
}
