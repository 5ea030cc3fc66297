//! Snapshot scans for secret searches.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::path::PathSegmentMatcher;
use crate::cancel::ScanCancel;
use crate::error::{SearchError, SearchResult};
use crate::indexer::Snapshot;
use crate::types::{SearchCriteria, SortDirection};

/// How the content scan decides whether a search string matches.
#[derive(Debug, Clone)]
enum ContentMatcher {
    /// Lowercased substring.
    Term(String),
    /// Applied to the lowercase search string as-is.
    Pattern(Regex),
}

impl ContentMatcher {
    fn matches(&self, search_string: &str) -> bool {
        match self {
            Self::Term(term) => search_string.contains(term.as_str()),
            Self::Pattern(regex) => regex.is_match(search_string),
        }
    }
}

/// Criteria validated and compiled once, ready to run against any snapshot.
#[derive(Debug, Clone)]
pub struct CompiledSearch {
    content: Option<ContentMatcher>,
    path: Option<PathSegmentMatcher>,
    sort: Option<SortDirection>,
    decorate: bool,
}

impl CompiledSearch {
    pub fn compile(criteria: &SearchCriteria) -> SearchResult<Self> {
        let criteria = criteria.clone().normalized();
        criteria.validate()?;

        let content = match (&criteria.term, &criteria.regex_pattern) {
            (Some(term), _) => Some(ContentMatcher::Term(term.to_lowercase())),
            (None, Some(pattern)) => {
                let regex = Regex::new(pattern).map_err(|error| {
                    SearchError::InvalidCriteria(format!("invalid regular expression: {error}"))
                })?;
                Some(ContentMatcher::Pattern(regex))
            }
            (None, None) => None,
        };

        Ok(Self {
            content,
            path: criteria.path_segment.as_deref().map(PathSegmentMatcher::new),
            sort: criteria.sort,
            decorate: criteria.decorate,
        })
    }

    /// Runs the content and path scans side by side and combines them.
    ///
    /// Returns `None` if the scan was cancelled before it finished.
    pub fn scan(&self, snapshot: &Snapshot, cancel: &ScanCancel) -> Option<Vec<String>> {
        let (content, path) = rayon::join(
            || {
                self.content
                    .as_ref()
                    .map(|matcher| content_scan(snapshot, matcher, cancel))
            },
            || {
                self.path
                    .as_ref()
                    .map(|matcher| path_scan(snapshot, matcher, cancel))
            },
        );

        let matches = match (content, path) {
            (Some(content), Some(path)) => intersect(content?, path?),
            (Some(content), None) => content?,
            (None, Some(path)) => path?,
            (None, None) => Vec::new(),
        };
        cancel.is_cancelled()?;
        Some(matches)
    }

    /// Applies ordering and UI decoration to raw path matches.
    pub fn finish(&self, mut matches: Vec<String>, ui_base_url: &str) -> Vec<String> {
        if let Some(sort) = self.sort {
            matches.sort_unstable();
            if sort == SortDirection::Desc {
                matches.reverse();
            }
        }
        if self.decorate {
            let base = ui_base_url.trim_end_matches('/');
            for path in &mut matches {
                *path = format!("{base}/{path}");
            }
        }
        matches
    }
}

fn content_scan(
    snapshot: &Snapshot,
    matcher: &ContentMatcher,
    cancel: &ScanCancel,
) -> Option<Vec<String>> {
    let mut matches = Vec::new();
    for (i, (path, record)) in snapshot.iter().enumerate() {
        cancel.is_cancelled_sparse(i)?;
        if matcher.matches(&record.search_string) {
            matches.push(path.clone());
        }
    }
    Some(matches)
}

fn path_scan(
    snapshot: &Snapshot,
    matcher: &PathSegmentMatcher,
    cancel: &ScanCancel,
) -> Option<Vec<String>> {
    let mut matches = Vec::new();
    for (i, path) in snapshot.paths().enumerate() {
        cancel.is_cancelled_sparse(i)?;
        if matcher.matches(path) {
            matches.push(path.to_string());
        }
    }
    Some(matches)
}

fn intersect(content: Vec<String>, path: Vec<String>) -> Vec<String> {
    let content: HashSet<String> = content.into_iter().collect();
    path.into_iter()
        .filter(|candidate| content.contains(candidate))
        .collect()
}

/// Runs a compiled search against one snapshot on the blocking pool.
pub async fn search_snapshot(
    snapshot: Arc<Snapshot>,
    compiled: CompiledSearch,
    ui_base_url: String,
    timeout: Duration,
) -> SearchResult<Vec<String>> {
    let scan = compiled.clone();
    let matches = run_with_timeout(timeout, move |cancel| scan.scan(&snapshot, &cancel)).await?;
    Ok(compiled.finish(matches, &ui_base_url))
}

/// Runs `work` on the blocking pool, cancelling it once `timeout` elapses.
pub(crate) async fn run_with_timeout<F>(timeout: Duration, work: F) -> SearchResult<Vec<String>>
where
    F: FnOnce(ScanCancel) -> Option<Vec<String>> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancel = ScanCancel::new(token.clone());
    let handle = tokio::task::spawn_blocking(move || work(cancel));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Some(matches))) => Ok(matches),
        Ok(Ok(None)) => Err(SearchError::Timeout(timeout)),
        Ok(Err(join_error)) => Err(SearchError::Internal(format!(
            "search task failed: {join_error}"
        ))),
        Err(_elapsed) => {
            token.cancel();
            log::warn!("search exceeded timeout_ms={}", timeout.as_millis());
            Err(SearchError::Timeout(timeout))
        }
    }
}
