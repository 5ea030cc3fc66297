//! Manual rebuild endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use secret_index::RebuildTrigger;

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RebuildRequest {
    /// Must be the string `"true"`.
    pub rebuild: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RebuildResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/rebuild",
    tag = "status",
    request_body = RebuildRequest,
    responses(
        (status = 200, description = "Rebuild started in the background", body = RebuildResponse),
        (status = 400, body = ApiErrorResponse),
        (status = 405, body = ApiErrorResponse),
        (status = 409, description = "A rebuild is already running", body = ApiErrorResponse),
    )
)]
pub(crate) async fn rebuild(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<RebuildResponse>, ApiError> {
    let request: RebuildRequest = serde_json::from_slice(&body).map_err(|error| {
        tracing::warn!(%error, "failed to decode rebuild request body");
        ApiError::bad_request("Invalid JSON body")
    })?;
    if request.rebuild != "true" {
        return Err(ApiError::bad_request(
            "Invalid value for 'rebuild'; expected 'true'",
        ));
    }

    tracing::info!("received request to rebuild cache");
    match state.index.trigger_rebuild() {
        RebuildTrigger::Accepted => Ok(Json(RebuildResponse {
            message: "Cache rebuild started".to_string(),
        })),
        RebuildTrigger::AlreadyInProgress => {
            Err(ApiError::conflict("Cache rebuild already in progress"))
        }
    }
}

pub(crate) async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed("Only POST method is allowed")
}
