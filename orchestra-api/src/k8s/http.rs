use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use crate::k8s::{K8sClient, K8sError};

/// Field manager identifying this service in server-side apply patches.
const FIELD_MANAGER: &str = "orchestra-api";

/// [`K8sClient`] implementation backed by the [`kube`] crate.
///
/// Talks to the cluster using the ambient configuration: in-cluster service
/// account credentials when deployed, or the local kubeconfig during
/// development.
pub struct HttpK8sClient {
    pods_api: Api<Pod>,
    config_maps_api: Api<ConfigMap>,
}

impl HttpK8sClient {
    /// Creates a new client scoped to the given namespace.
    pub async fn new(namespace: &str) -> Result<HttpK8sClient, K8sError> {
        let client = Client::try_default().await?;

        let pods_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
        let config_maps_api: Api<ConfigMap> = Api::namespaced(client, namespace);

        Ok(HttpK8sClient {
            pods_api,
            config_maps_api,
        })
    }
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn create_pod(&self, pod: &Pod) -> Result<String, K8sError> {
        debug!("creating pod");

        let created = self.pods_api.create(&PostParams::default(), pod).await?;
        let name = created.metadata.name.ok_or(K8sError::MissingResourceName)?;

        debug!(name, "pod created");

        Ok(name)
    }

    async fn get_config_map(&self, config_map_name: &str) -> Result<Option<ConfigMap>, K8sError> {
        debug!(name = config_map_name, "getting config map");

        let config_map = self.config_maps_api.get_opt(config_map_name).await?;

        Ok(config_map)
    }

    async fn create_or_update_config_map(
        &self,
        config_map_name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), K8sError> {
        debug!(name = config_map_name, "patching config map");

        // apiVersion and kind must be part of the patch body for server-side
        // apply to accept it.
        let config_map = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": config_map_name,
            },
            "data": data,
        });

        self.config_maps_api
            .patch(
                config_map_name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(config_map),
            )
            .await?;

        debug!(name = config_map_name, "config map patched");

        Ok(())
    }
}
