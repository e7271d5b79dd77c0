use actix_web::{
    HttpResponse, Responder, ResponseError, get,
    http::{StatusCode, header::ContentType},
    post, put,
    web::{Data, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

use crate::k8s::{K8sClient, K8sError};
use crate::routes::ErrorMessage;
use crate::settings::{ClusterSettings, SettingsError};

#[derive(Debug, Error)]
enum SettingsApiError {
    #[error(transparent)]
    Invalid(#[from] SettingsError),

    #[error(transparent)]
    K8s(#[from] K8sError),
}

impl SettingsApiError {
    fn to_message(&self) -> String {
        match self {
            // Do not expose cluster internals in error messages; validation
            // errors name the offending key and are safe to return.
            SettingsApiError::K8s(_) => "internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

impl ResponseError for SettingsApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            SettingsApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            SettingsApiError::K8s(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
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
pub struct SettingsUpdateResponse {
    /// Whether the saved change requires a cluster restart to take effect.
    #[schema(example = true)]
    pub requires_restart: bool,
    /// The resulting settings mapping.
    #[schema(value_type = Object)]
    pub user_config: BTreeMap<String, Value>,
}

#[utoipa::path(
    summary = "Get the cluster settings",
    description = "Returns the full settings mapping.",
    responses(
        (status = 200, description = "The cluster settings", body = Object),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Settings",
)]
#[get("/orchest-settings")]
pub async fn read_settings(
    k8s_client: Data<dyn K8sClient>,
) -> Result<impl Responder, SettingsApiError> {
    let settings = ClusterSettings::load(&**k8s_client).await?;

    Ok(Json(settings.as_map()))
}

#[utoipa::path(
    summary = "Update the cluster settings",
    description = "Merges the given key/value pairs into the settings, an \
                   upsert. Returns the updated settings and whether the \
                   change requires a cluster restart. A 400 with an error \
                   message is returned if any value is unknown or of the \
                   wrong type; the settings are then left unchanged.",
    request_body = Object,
    responses(
        (status = 200, description = "Settings updated", body = SettingsUpdateResponse),
        (status = 400, description = "Invalid settings", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Settings",
)]
#[put("/orchest-settings")]
pub async fn update_settings(
    k8s_client: Data<dyn K8sClient>,
    payload: Json<Map<String, Value>>,
) -> Result<impl Responder, SettingsApiError> {
    let mut settings = ClusterSettings::load(&**k8s_client).await?;

    settings.update(&payload)?;
    let requires_restart = settings.save(&**k8s_client).await?;

    Ok(Json(SettingsUpdateResponse {
        requires_restart,
        user_config: settings.as_map(),
    }))
}

#[utoipa::path(
    summary = "Replace the cluster settings",
    description = "Replaces the settings with the given mapping. Protected \
                   keys omitted from the mapping keep their previous value. \
                   Returns the new settings and whether the change requires \
                   a cluster restart. A 400 with an error message is \
                   returned if any value is unknown or of the wrong type; \
                   the settings are then left unchanged.",
    request_body = Object,
    responses(
        (status = 200, description = "Settings replaced", body = SettingsUpdateResponse),
        (status = 400, description = "Invalid settings", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Settings",
)]
#[post("/orchest-settings")]
pub async fn replace_settings(
    k8s_client: Data<dyn K8sClient>,
    payload: Json<Map<String, Value>>,
) -> Result<impl Responder, SettingsApiError> {
    let mut settings = ClusterSettings::load(&**k8s_client).await?;

    settings.set(&payload)?;
    let requires_restart = settings.save(&**k8s_client).await?;

    Ok(Json(SettingsUpdateResponse {
        requires_restart,
        user_config: settings.as_map(),
    }))
}
