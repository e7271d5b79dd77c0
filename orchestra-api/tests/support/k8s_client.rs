#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use orchestra_api::k8s::{K8sClient, K8sError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Recording [`K8sClient`] mock.
///
/// Keeps created pods and config map data in memory so tests can assert on
/// the manifests the API submitted, and can be flipped into a failing mode
/// to exercise error paths.
#[derive(Default)]
pub struct MockK8sClient {
    pub created_pods: Mutex<Vec<Pod>>,
    pub config_maps: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    pub fail_pod_creation: AtomicBool,
    pub fail_config_map_access: AtomicBool,
}

impl MockK8sClient {
    pub fn new() -> MockK8sClient {
        MockK8sClient::default()
    }

    /// Makes every subsequent pod creation fail with an API error.
    pub fn fail_pod_creation(&self) {
        self.fail_pod_creation.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent config map read and write fail with an API
    /// error.
    pub fn fail_config_map_access(&self) {
        self.fail_config_map_access.store(true, Ordering::SeqCst);
    }

    /// Pre-populates a config map, as if it had been written by an earlier
    /// deployment.
    pub fn seed_config_map(&self, config_map_name: &str, data: BTreeMap<String, String>) {
        self.config_maps
            .lock()
            .unwrap()
            .insert(config_map_name.to_string(), data);
    }

    /// Returns a snapshot of the pods created so far, in creation order.
    pub fn created_pods(&self) -> Vec<Pod> {
        self.created_pods.lock().unwrap().clone()
    }
}

fn api_error() -> K8sError {
    K8sError::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "admission denied".to_string(),
        reason: "Forbidden".to_string(),
        code: 403,
    }))
}

#[async_trait]
impl K8sClient for MockK8sClient {
    async fn create_pod(&self, pod: &Pod) -> Result<String, K8sError> {
        if self.fail_pod_creation.load(Ordering::SeqCst) {
            return Err(api_error());
        }

        // Mimic the API server's name generation for pods submitted with
        // `generateName`.
        let name = pod
            .metadata
            .name
            .clone()
            .or_else(|| {
                pod.metadata
                    .generate_name
                    .as_ref()
                    .map(|prefix| format!("{prefix}x7f2k"))
            })
            .ok_or(K8sError::MissingResourceName)?;

        self.created_pods.lock().unwrap().push(pod.clone());

        Ok(name)
    }

    async fn get_config_map(&self, config_map_name: &str) -> Result<Option<ConfigMap>, K8sError> {
        if self.fail_config_map_access.load(Ordering::SeqCst) {
            return Err(api_error());
        }

        let config_maps = self.config_maps.lock().unwrap();

        Ok(config_maps.get(config_map_name).map(|data| ConfigMap {
            data: Some(data.clone()),
            ..ConfigMap::default()
        }))
    }

    async fn create_or_update_config_map(
        &self,
        config_map_name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), K8sError> {
        if self.fail_config_map_access.load(Ordering::SeqCst) {
            return Err(api_error());
        }

        self.config_maps
            .lock()
            .unwrap()
            .insert(config_map_name.to_string(), data);

        Ok(())
    }
}
