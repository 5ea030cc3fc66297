//! Cache status endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use secret_index::CacheStatus;

use crate::server::ServerState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub version: String,
    /// Time since the last completed build, e.g. `2m 5s`.
    pub cache_age: String,
    /// Rounded to 10 seconds while a rebuild is running.
    pub build_duration: String,
    pub is_rebuilding: bool,
    pub cache_in_mem_size: String,
    pub fetched_secrets: u64,
    pub total_secrets: u64,
    pub total_keys_indexed: u64,
    pub progress_percentage: u64,
    pub indexed_secrets: usize,
    pub fetch_failures: u64,
    pub permission_denied: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_built_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StatusResponse {
    pub fn new(version: &str, status: CacheStatus) -> Self {
        Self {
            version: version.to_string(),
            cache_age: human_duration(status.cache_age.unwrap_or_default()),
            build_duration: human_duration(status.build_duration),
            is_rebuilding: status.rebuilding,
            cache_in_mem_size: ByteSize(status.approx_size_bytes).to_string(),
            fetched_secrets: status.fetched,
            total_secrets: status.discovered,
            total_keys_indexed: status.keys_indexed,
            progress_percentage: status.progress_percent,
            indexed_secrets: status.indexed_secrets,
            fetch_failures: status.fetch_failures,
            permission_denied: status.permission_denied,
            last_built_at: status.last_built_at.map(|at| at.to_rfc3339()),
            last_error: status.last_error,
        }
    }
}

/// Whole seconds only, `0s` for zero.
pub fn human_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    responses(
        (status = 200, description = "Cache and rebuild status", body = StatusResponse),
    )
)]
pub(crate) async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    tracing::debug!("status requested");
    Json(StatusResponse::new(state.version, state.index.status()))
}
