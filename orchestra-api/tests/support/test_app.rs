#![allow(dead_code)]

use k8s_openapi::api::core::v1::Pod;
use orchestra_api::config::ApiConfig;
use orchestra_api::k8s::K8sClient;
use orchestra_api::startup::run;
use orchestra_config::{Environment, load_config};
use serde_json::Value;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use crate::support::k8s_client::MockK8sClient;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub k8s_client: Arc<MockK8sClient>,
    pub config: ApiConfig,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub async fn start_update(&self) -> reqwest::Response {
        self.api_client
            .post(format!("{}/start-update", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn restart(&self) -> reqwest::Response {
        self.api_client
            .post(format!("{}/restart", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn images_to_pre_pull(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/orchest-images-to-pre-pull", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn read_settings(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/orchest-settings", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn update_settings(&self, payload: &Value) -> reqwest::Response {
        self.api_client
            .put(format!("{}/orchest-settings", &self.address))
            .json(payload)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn replace_settings(&self, payload: &Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/orchest-settings", &self.address))
            .json(payload)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Pods the API submitted to the mock cluster, in creation order.
    pub fn created_pods(&self) -> Vec<Pod> {
        self.k8s_client.created_pods()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

pub async fn spawn_test_app() -> TestApp {
    // We set the environment to dev.
    Environment::Dev.set();

    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let config = load_config::<ApiConfig>().expect("Failed to read configuration");

    let k8s_client = Arc::new(MockK8sClient::new());

    let server = run(
        config.clone(),
        listener,
        k8s_client.clone() as Arc<dyn K8sClient>,
    )
    .await
    .expect("failed to bind address");

    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        k8s_client,
        config,
        server_handle,
    }
}
