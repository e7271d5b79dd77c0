use actix_web::{
    HttpResponse, Responder, ResponseError, get,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::k8s::{K8sClient, K8sError};
use crate::manifest::{CommandKind, ManifestError, PodManifestBuilder};
use crate::routes::ErrorMessage;
use crate::settings::ClusterSettings;

/// Versioned platform images every node should pre-pull for a better UX.
const PRE_PULL_IMAGE_NAMES: &[&str] = &["jupyter-enterprise-gateway", "session-sidecar"];

#[derive(Debug, Error)]
enum CtlError {
    #[error("failed to update")]
    Update(#[source] CommandDispatchError),

    #[error("failed to restart")]
    Restart(#[source] CommandDispatchError),

    #[error(transparent)]
    K8s(#[from] K8sError),
}

/// Failure modes of a control command dispatch, kept separate from
/// [`CtlError`] so the response message stays fixed while the cause is
/// logged in full.
#[derive(Debug, Error)]
enum CommandDispatchError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    K8s(#[from] K8sError),
}

impl CtlError {
    fn to_message(&self) -> String {
        match self {
            // Do not expose cluster internals in error messages.
            CtlError::K8s(_) => "internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

impl ResponseError for CtlError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            message: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PrePullImagesResponse {
    #[schema(example = json!(["orchest/session-sidecar:v1.4.2"]))]
    pub pre_pull_images: Vec<String>,
}

#[utoipa::path(
    summary = "Start a cluster update",
    description = "Submits an update control pod together with its update \
                   sidecar. The control pod waits for the sidecar to become \
                   reachable before issuing the update command.",
    responses(
        (status = 201, description = "Update started"),
        (status = 500, description = "Failed to start the update", body = ErrorMessage),
    ),
    tag = "Ctl",
)]
#[post("/start-update")]
pub async fn start_update(
    config: Data<ApiConfig>,
    k8s_client: Data<dyn K8sClient>,
) -> Result<impl Responder, CtlError> {
    dispatch_update(&config, &**k8s_client)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to dispatch the update pods");
            CtlError::Update(err)
        })?;

    Ok(HttpResponse::Created().finish())
}

async fn dispatch_update(
    config: &ApiConfig,
    k8s_client: &dyn K8sClient,
) -> Result<(), CommandDispatchError> {
    let builder = PodManifestBuilder::new(config.cluster.clone());

    let ctl_pod = builder.build_ctl_pod(CommandKind::Update)?;
    // The builder assigns the name, so the sidecar can reference the update
    // pod before either of them exists.
    let ctl_pod_name = ctl_pod.metadata.name.clone().unwrap_or_default();

    let token = Uuid::new_v4().to_string();
    let sidecar_pod = builder.build_update_sidecar_pod(&ctl_pod_name, &token);

    // The sidecar goes first: the update pod polls for it and would spin
    // needlessly otherwise.
    let sidecar_name = k8s_client.create_pod(&sidecar_pod).await?;
    let ctl_name = k8s_client.create_pod(&ctl_pod).await?;

    info!(
        update_pod = ctl_name,
        sidecar_pod = sidecar_name,
        "update pods submitted"
    );

    Ok(())
}

#[utoipa::path(
    summary = "Restart the cluster",
    description = "Submits a restart control pod. No readiness gate is \
                   involved; the pod issues the restart command directly.",
    responses(
        (status = 201, description = "Restart started"),
        (status = 500, description = "Failed to start the restart", body = ErrorMessage),
    ),
    tag = "Ctl",
)]
#[post("/restart")]
pub async fn restart(
    config: Data<ApiConfig>,
    k8s_client: Data<dyn K8sClient>,
) -> Result<impl Responder, CtlError> {
    dispatch_restart(&config, &**k8s_client)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to dispatch the restart pod");
            CtlError::Restart(err)
        })?;

    Ok(HttpResponse::Created().finish())
}

async fn dispatch_restart(
    config: &ApiConfig,
    k8s_client: &dyn K8sClient,
) -> Result<(), CommandDispatchError> {
    let builder = PodManifestBuilder::new(config.cluster.clone());

    let restart_pod = builder.build_ctl_pod(CommandKind::Restart)?;
    let name = k8s_client.create_pod(&restart_pod).await?;

    info!(pod = name, "restart pod submitted");

    Ok(())
}

#[utoipa::path(
    summary = "Platform images to pre-pull",
    description = "Lists the platform images every node should pre-pull so \
                   sessions and builds start without an image pull delay.",
    responses(
        (status = 200, description = "Images to pre-pull", body = PrePullImagesResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Ctl",
)]
#[get("/orchest-images-to-pre-pull")]
pub async fn images_to_pre_pull(
    config: Data<ApiConfig>,
    k8s_client: Data<dyn K8sClient>,
) -> Result<impl Responder, CtlError> {
    let settings = ClusterSettings::load(&**k8s_client).await?;

    let cluster = &config.cluster;
    let mut pre_pull_images: Vec<String> = PRE_PULL_IMAGE_NAMES
        .iter()
        .map(|name| cluster.versioned_image(name))
        .collect();
    pre_pull_images.push(cluster.image_builder_image.clone());

    // Settings may override the jupyter-server image with a custom build.
    let jupyter_image = settings
        .get("custom_jupyter_image")
        .and_then(|value| value.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| cluster.jupyter_server_image.clone());
    pre_pull_images.push(jupyter_image);

    Ok(Json(PrePullImagesResponse { pre_pull_images }))
}
