//! Search endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use secret_index::{SearchCriteria, SortDirection};

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Case-insensitive substring matched against secret paths and key names.
    pub term: Option<String>,
    /// Regular expression matched against the lowercase path and key names.
    pub regexp: Option<String>,
    /// Whole path segment(s) the secret path must contain.
    pub in_path: Option<String>,
    /// `asc` or `desc`.
    pub sort: Option<String>,
    /// `true` to return UI links instead of paths.
    pub show_ui: Option<String>,
}

impl SearchParams {
    fn into_criteria(self) -> Result<SearchCriteria, ApiError> {
        let sort = match self.sort.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<SortDirection>()?),
        };
        let criteria = SearchCriteria {
            term: self.term,
            regex_pattern: self.regexp,
            path_segment: self.in_path,
            sort,
            decorate: self.show_ui.as_deref() == Some("true"),
        }
        .normalized();
        criteria.validate()?;
        Ok(criteria)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub matches: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/search",
    tag = "search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching secret paths or UI links", body = SearchResponse),
        (status = 400, body = ApiErrorResponse),
        (status = 504, body = ApiErrorResponse),
    ),
    description = "Search the cached secret index by key name, regular expression, or path segment."
)]
pub(crate) async fn search(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let criteria = params.into_criteria()?;
    tracing::info!(
        term = criteria.term.as_deref().unwrap_or_default(),
        regexp = criteria.regex_pattern.as_deref().unwrap_or_default(),
        in_path = criteria.path_segment.as_deref().unwrap_or_default(),
        "search request received"
    );

    let matches = state.index.search(&criteria).await.map_err(|error| {
        tracing::warn!(%error, "search failed");
        ApiError::from(error)
    })?;

    tracing::info!(matches = matches.len(), "search completed");
    Ok(Json(SearchResponse { matches }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(term: Option<&str>, regexp: Option<&str>, in_path: Option<&str>) -> SearchParams {
        SearchParams {
            term: term.map(str::to_string),
            regexp: regexp.map(str::to_string),
            in_path: in_path.map(str::to_string),
            ..SearchParams::default()
        }
    }

    #[test]
    fn empty_params_are_rejected() {
        let error = params(Some(""), None, None).into_criteria().expect_err("empty");
        assert_eq!(error.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn show_ui_requires_literal_true() {
        let mut raw = params(Some("db"), None, None);
        raw.show_ui = Some("1".to_string());
        assert!(!raw.into_criteria().expect("criteria").decorate);

        let mut raw = params(Some("db"), None, None);
        raw.show_ui = Some("true".to_string());
        assert!(raw.into_criteria().expect("criteria").decorate);
    }

    #[test]
    fn sort_is_validated() {
        let mut raw = params(None, None, Some("prod"));
        raw.sort = Some("sideways".to_string());
        assert!(raw.into_criteria().is_err());

        let mut raw = params(None, None, Some("prod"));
        raw.sort = Some("desc".to_string());
        assert_eq!(
            raw.into_criteria().expect("criteria").sort,
            Some(SortDirection::Desc)
        );
    }
}
