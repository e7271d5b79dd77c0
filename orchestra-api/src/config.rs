use orchestra_config::SentryConfig;
use serde::Deserialize;
use std::fmt;

/// Complete configuration for the orchestra control-plane API.
///
/// Contains the HTTP server settings, the identity of the managed cluster,
/// and optional Sentry monitoring.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Managed cluster identity and image references.
    pub cluster: ClusterConfig,
    /// Optional Sentry configuration for error tracking.
    pub sentry: Option<SentryConfig>,
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)
    }
}

/// Identity of the managed cluster and the image references the control
/// plane stamps into generated manifests.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Name of the cluster, used as a top-level log field.
    pub name: String,
    /// Namespace all control-plane resources live in.
    pub namespace: String,
    /// Version of the cluster, stamped into manifests and image tags.
    pub version: String,
    /// Image registry prefix for platform images, e.g. `orchest`.
    pub registry: String,
    /// Path to the base YAML template for the control pod.
    pub ctl_pod_template_path: String,
    /// Service account the generated pods run under.
    pub service_account: String,
    /// Image used to build user environments, pre-pulled on all nodes.
    pub image_builder_image: String,
    /// Default jupyter-server image, pre-pulled on all nodes.
    pub jupyter_server_image: String,
}

impl ClusterConfig {
    /// Returns the versioned reference of a platform image, e.g.
    /// `orchest/orchest-ctl:v1.4.2`.
    pub fn versioned_image(&self, name: &str) -> String {
        format!("{}/{}:{}", self.registry, name, self.version)
    }
}
