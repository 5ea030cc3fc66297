use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use secret_index::SearchError;

/// Standardised API error response body.
///
/// Every error returned by the HTTP layer serialises as:
/// ```json
/// { "ok": false, "error": { "code": "<code>", "message": "<message>" } }
/// ```
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorResponse {
    pub ok: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse {
                ok: false,
                error: ApiErrorBody {
                    code: code.into(),
                    message: message.into(),
                },
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.body.error.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidCriteria(msg) => Self::bad_request(msg),
            SearchError::Timeout(_) => Self::gateway_timeout("Search timeout exceeded"),
            SearchError::Internal(msg) => {
                tracing::error!(error = %msg, "error during search");
                Self::internal("Error during search")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn search_errors_map_to_status_codes() {
        let invalid = ApiError::from(SearchError::InvalidCriteria("bad".to_string()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.message(), "bad");

        let timeout = ApiError::from(SearchError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.message(), "Search timeout exceeded");

        let internal = ApiError::from(SearchError::Internal("panic".to_string()));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message(), "Error during search");
    }

    #[test]
    fn envelope_marks_failure() {
        let error = ApiError::conflict("busy");
        let json = serde_json::to_value(&error.body).expect("serialize");
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "conflict");
        assert_eq!(json["error"]["message"], "busy");
    }
}
