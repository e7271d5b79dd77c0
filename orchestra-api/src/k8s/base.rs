use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors emitted by the Kubernetes integration.
///
/// Variants wrap lower-level libraries where appropriate to preserve context.
#[derive(Debug, Error)]
pub enum K8sError {
    /// A serialization error while building or parsing Kubernetes resources.
    #[error("An error occurred in serde when dealing with K8s: {0}")]
    Serde(#[from] serde_json::error::Error),
    /// An error returned by the [`kube`] client when talking to the API
    /// server.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
    /// The API server accepted a resource but returned it without a name.
    #[error("The created resource has no name")]
    MissingResourceName,
}

/// Client interface describing the Kubernetes operations used by the API.
///
/// Implementations are expected to be idempotent where possible by issuing
/// server-side apply patches for create-or-update behaviors.
#[async_trait]
pub trait K8sClient: Send + Sync {
    /// Submits a pod to the cluster and returns the name it was created
    /// under.
    async fn create_pod(&self, pod: &Pod) -> Result<String, K8sError>;

    /// Retrieves a named [`ConfigMap`], or `None` if it does not exist.
    async fn get_config_map(&self, config_map_name: &str) -> Result<Option<ConfigMap>, K8sError>;

    /// Creates or updates a [`ConfigMap`] with the given data.
    async fn create_or_update_config_map(
        &self,
        config_map_name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), K8sError>;
}
