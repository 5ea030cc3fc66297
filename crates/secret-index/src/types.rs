//! Core result and request types for the secret index.
//!
//! The service crate converts these to API payload types for serialization.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Extracted keys for one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Every key name reachable in the payload, in discovery order.
    pub all_keys: Vec<String>,
    /// Lowercased path and keys, space-joined.
    pub search_string: String,
}

impl SecretRecord {
    pub fn new(all_keys: Vec<String>, search_string: String) -> Self {
        Self {
            all_keys,
            search_string,
        }
    }
}

/// Result ordering requested by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = SearchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(SearchError::InvalidCriteria(format!(
                "'sort' must be 'asc' or 'desc', got {other:?}"
            ))),
        }
    }
}

/// What to look for and how to shape the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Case-insensitive substring matched against the search string.
    pub term: Option<String>,
    /// Regular expression matched against the lowercase search string.
    pub regex_pattern: Option<String>,
    /// Whole `/`-delimited segment(s) that must occur in the path.
    pub path_segment: Option<String>,
    pub sort: Option<SortDirection>,
    /// Rewrite each match into a backend UI link.
    pub decorate: bool,
}

impl SearchCriteria {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex_pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn path_segment(segment: impl Into<String>) -> Self {
        Self {
            path_segment: Some(segment.into()),
            ..Self::default()
        }
    }

    pub fn with_path_segment(mut self, segment: impl Into<String>) -> Self {
        self.path_segment = Some(segment.into());
        self
    }

    pub fn with_sort(mut self, sort: SortDirection) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn decorated(mut self) -> Self {
        self.decorate = true;
        self
    }

    /// Drops empty strings so that `Some("")` behaves like an absent criterion.
    pub fn normalized(self) -> Self {
        Self {
            term: self.term.filter(|value| !value.is_empty()),
            regex_pattern: self.regex_pattern.filter(|value| !value.is_empty()),
            path_segment: self.path_segment.filter(|value| !value.is_empty()),
            sort: self.sort,
            decorate: self.decorate,
        }
    }

    /// Checks the combination rules without compiling the regex.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.term.is_none() && self.regex_pattern.is_none() && self.path_segment.is_none() {
            return Err(SearchError::InvalidCriteria(
                "at least one of 'term', 'regexp', or 'in_path' is required".to_string(),
            ));
        }
        if self.term.is_some() && self.regex_pattern.is_some() {
            return Err(SearchError::InvalidCriteria(
                "'term' and 'regexp' are mutually exclusive, use only one".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_content_criteria(&self) -> bool {
        self.term.is_some() || self.regex_pattern.is_some()
    }
}

/// Outcome of asking for a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTrigger {
    Accepted,
    AlreadyInProgress,
}

/// Outcome of a rebuild that was allowed to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Completed(RebuildSummary),
    AlreadyInProgress,
}

/// Numbers reported by a completed rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub discovered: u64,
    pub indexed: usize,
    pub keys_indexed: u64,
    pub fetch_failures: u64,
    pub permission_denied: u64,
    pub elapsed: Duration,
}

/// Point-in-time view of the cache and its build progress.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatus {
    pub rebuilding: bool,
    /// Rounded to 10 seconds while a rebuild runs, exact once finished.
    pub build_duration: Duration,
    /// Time since the last completed build; `None` if no build has completed.
    pub cache_age: Option<Duration>,
    pub last_built_at: Option<DateTime<Utc>>,
    pub approx_size_bytes: u64,
    /// Entries in the published snapshot.
    pub indexed_secrets: usize,
    pub discovered: u64,
    pub fetched: u64,
    pub keys_indexed: u64,
    pub fetch_failures: u64,
    pub permission_denied: u64,
    pub progress_percent: u64,
    pub last_error: Option<String>,
}
