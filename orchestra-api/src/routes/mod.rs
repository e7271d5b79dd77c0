use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod ctl;
pub mod health_check;
pub mod settings;

/// Error body returned by all failing routes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = "an error occurred in the api")]
    pub message: String,
}
