use utoipa::OpenApi;

use crate::server::error::{ApiErrorBody, ApiErrorResponse};
use crate::server::rebuild::{RebuildRequest, RebuildResponse};
use crate::server::search::SearchResponse;
use crate::server::status::StatusResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vault Search API",
        version = "0.1.0",
        description = "Key-name search over a cached Vault KV mount"
    ),
    paths(
        crate::server::health,
        crate::server::search::search,
        crate::server::status::status,
        crate::server::rebuild::rebuild,
    ),
    components(schemas(
        // Error
        ApiErrorResponse,
        ApiErrorBody,
        // Search
        SearchResponse,
        // Status
        StatusResponse,
        RebuildRequest,
        RebuildResponse,
    )),
    tags(
        (name = "search", description = "Secret search"),
        (name = "status", description = "Cache status and rebuilds"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let spec = ApiDoc::openapi().to_pretty_json().expect("serialize spec");
        for path in ["/health", "/search", "/status", "/rebuild"] {
            assert!(spec.contains(&format!("\"{path}\"")), "missing {path}");
        }
        assert!(spec.contains("StatusResponse"));
    }
}
