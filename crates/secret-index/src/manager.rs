//! SecretIndex - main API for the secret search cache.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::SecretBackend;
use crate::config::IndexConfig;
use crate::error::{RebuildError, SearchResult};
use crate::extract::KeyExtractor;
use crate::indexer::{BuildGuard, IndexShared, RebuildJob, Snapshot};
use crate::search::{search_snapshot, CompiledSearch};
use crate::types::{CacheStatus, RebuildOutcome, RebuildTrigger, SearchCriteria};

/// A searchable, periodically rebuilt view of every secret under a mount.
///
/// Cloning is cheap; clones share the same cache and single-flight slot.
#[derive(Clone)]
pub struct SecretIndex {
    shared: Arc<IndexShared>,
    backend: Arc<dyn SecretBackend>,
    config: IndexConfig,
    extractor: KeyExtractor,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SecretIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretIndex")
            .field("shared", &self.shared)
            .field("config", &self.config)
            .field("backend", &"<backend>")
            .finish()
    }
}

impl SecretIndex {
    pub fn new(backend: Arc<dyn SecretBackend>, config: IndexConfig) -> Self {
        let extractor = KeyExtractor::new(config.max_nested_depth);
        Self {
            shared: Arc::new(IndexShared::default()),
            backend,
            config,
            extractor,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn job(&self) -> RebuildJob {
        RebuildJob {
            shared: self.shared.clone(),
            backend: self.backend.clone(),
            extractor: self.extractor,
            list_concurrency: self.config.list_concurrency,
            fetch_concurrency: self.config.fetch_concurrency,
            cancel: self.shutdown.clone(),
        }
    }

    /// Rebuilds the cache and waits for the result.
    ///
    /// Returns [`RebuildOutcome::AlreadyInProgress`] without waiting if another
    /// rebuild holds the slot.
    pub async fn rebuild_now(&self) -> Result<RebuildOutcome, RebuildError> {
        let Some(guard) = BuildGuard::acquire(&self.shared) else {
            log::info!("cache rebuild already in progress, skipping");
            return Ok(RebuildOutcome::AlreadyInProgress);
        };
        let started = self.shared.begin_build();
        let summary = self.job().run(guard, started).await?;
        Ok(RebuildOutcome::Completed(summary))
    }

    /// Starts a rebuild in the background.
    ///
    /// The single-flight slot is taken before this returns, so a second call
    /// made right after an `Accepted` one always sees `AlreadyInProgress`.
    pub fn trigger_rebuild(&self) -> RebuildTrigger {
        let Some(guard) = BuildGuard::acquire(&self.shared) else {
            log::info!("cache rebuild already in progress, skipping");
            return RebuildTrigger::AlreadyInProgress;
        };
        // Progress resets before the task is scheduled.
        let started = self.shared.begin_build();
        let job = self.job();
        tokio::spawn(async move {
            if let Err(error) = job.run(guard, started).await {
                log::error!("background cache rebuild failed: {}", error);
            }
        });
        RebuildTrigger::Accepted
    }

    pub fn is_rebuilding(&self) -> bool {
        self.shared.is_rebuilding()
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.shared.current_snapshot()
    }

    pub fn status(&self) -> CacheStatus {
        self.shared.status()
    }

    /// Searches the current snapshot using the configured timeout.
    pub async fn search(&self, criteria: &SearchCriteria) -> SearchResult<Vec<String>> {
        self.search_with_timeout(criteria, self.config.search_timeout)
            .await
    }

    pub async fn search_with_timeout(
        &self,
        criteria: &SearchCriteria,
        timeout: Duration,
    ) -> SearchResult<Vec<String>> {
        let compiled = CompiledSearch::compile(criteria)?;
        let snapshot = self.current_snapshot();
        log::debug!(
            "searching snapshot entries={} timeout_ms={}",
            snapshot.len(),
            timeout.as_millis()
        );
        search_snapshot(snapshot, compiled, self.config.ui_base_url.clone(), timeout).await
    }

    /// Cancels any running rebuild. Later rebuilds start already cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::{BackendError, SearchError};
    use crate::types::SortDirection;

    fn sample_backend() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::with_secrets([
            (
                "prod/db/credentials",
                json!({"username": "app", "password": "hunter2"}),
            ),
            ("prod/api", json!({"token": "abc"})),
            ("staging/db", json!({"password": "x", "cfg": "{\"host\": \"h\"}"})),
            ("game-products/x", json!({"password": "y"})),
        ]))
    }

    fn index_for(backend: &Arc<InMemoryBackend>) -> SecretIndex {
        let config = IndexConfig::default()
            .with_concurrency(3, 3)
            .with_ui_base_url("http://vault:8200/ui/vault/secrets/kv/show");
        SecretIndex::new(backend.clone(), config)
    }

    async fn wait_idle(index: &SecretIndex) {
        for _ in 0..500 {
            if !index.is_rebuilding() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("rebuild did not finish");
    }

    fn sorted(criteria: SearchCriteria) -> SearchCriteria {
        criteria.with_sort(SortDirection::Asc)
    }

    #[tokio::test]
    async fn rebuild_indexes_every_secret() {
        let backend = sample_backend();
        let index = index_for(&backend);

        let outcome = index.rebuild_now().await.expect("rebuild");
        let RebuildOutcome::Completed(summary) = outcome else {
            panic!("expected a completed rebuild");
        };
        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.indexed, 4);
        assert_eq!(summary.fetch_failures, 0);
        assert_eq!(summary.keys_indexed, 7);

        let status = index.status();
        assert!(!status.rebuilding);
        assert_eq!(status.indexed_secrets, 4);
        assert_eq!(status.progress_percent, 100);
        assert!(status.cache_age.is_some());
        assert!(status.approx_size_bytes > 0);
    }

    #[tokio::test]
    async fn search_combines_term_and_path() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("rebuild");

        let by_term = index
            .search(&sorted(SearchCriteria::term("PASSWORD")))
            .await
            .expect("search");
        assert_eq!(by_term, vec!["game-products/x", "prod/db/credentials", "staging/db"]);

        let by_path = index
            .search(&sorted(SearchCriteria::path_segment("prod")))
            .await
            .expect("search");
        assert_eq!(by_path, vec!["prod/api", "prod/db/credentials"]);

        let both = index
            .search(&SearchCriteria::term("password").with_path_segment("prod"))
            .await
            .expect("search");
        assert_eq!(both, vec!["prod/db/credentials"]);

        let embedded = index
            .search(&SearchCriteria::term("host"))
            .await
            .expect("search");
        assert_eq!(embedded, vec!["staging/db"]);
    }

    #[tokio::test]
    async fn search_sorts_descending_and_decorates() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("rebuild");

        let criteria = SearchCriteria::path_segment("prod")
            .with_sort(SortDirection::Desc)
            .decorated();
        let matches = index.search(&criteria).await.expect("search");
        assert_eq!(
            matches,
            vec![
                "http://vault:8200/ui/vault/secrets/kv/show/prod/db/credentials",
                "http://vault:8200/ui/vault/secrets/kv/show/prod/api",
            ]
        );
    }

    #[tokio::test]
    async fn search_rejects_bad_criteria() {
        let index = index_for(&sample_backend());
        let error = index
            .search(&SearchCriteria::default())
            .await
            .expect_err("empty criteria");
        assert!(matches!(error, SearchError::InvalidCriteria(_)));

        let error = index
            .search(&SearchCriteria::regex("(unclosed"))
            .await
            .expect_err("bad regex");
        assert!(matches!(error, SearchError::InvalidCriteria(_)));
    }

    #[tokio::test]
    async fn empty_cache_returns_no_matches() {
        let index = index_for(&sample_backend());
        let matches = index
            .search(&SearchCriteria::term("password"))
            .await
            .expect("search");
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn concurrent_rebuild_requests_are_single_flight() {
        let backend = sample_backend();
        let index = index_for(&backend);
        backend.pause_reads();

        assert_eq!(index.trigger_rebuild(), RebuildTrigger::Accepted);
        assert_eq!(index.trigger_rebuild(), RebuildTrigger::AlreadyInProgress);
        assert_eq!(
            index.rebuild_now().await.expect("rebuild"),
            RebuildOutcome::AlreadyInProgress
        );
        assert!(index.status().rebuilding);

        backend.resume_reads();
        wait_idle(&index).await;
        assert_eq!(index.current_snapshot().len(), 4);
        assert_eq!(index.trigger_rebuild(), RebuildTrigger::Accepted);
        wait_idle(&index).await;
    }

    #[tokio::test]
    async fn failed_listing_keeps_previous_snapshot() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("first rebuild");
        let before = index.current_snapshot();

        backend.insert("prod/new", json!({"extra": "1"}));
        backend.fail_list("prod", BackendError::with_status(500, "internal error"));
        let error = index.rebuild_now().await.expect_err("listing fails");
        assert!(matches!(error, RebuildError::Enumeration(_)));

        assert!(!index.is_rebuilding());
        assert!(Arc::ptr_eq(&before, &index.current_snapshot()));
        assert!(!index.current_snapshot().contains("prod/new"));
        let status = index.status();
        assert!(status.last_error.is_some());
        assert_eq!(status.indexed_secrets, 4);
        assert_eq!(status.discovered, 4);
        assert_eq!(status.fetched, 4);
        assert_eq!(status.keys_indexed, 7);
        assert_eq!(status.progress_percent, 100);

        backend.clear_failures();
        index.rebuild_now().await.expect("recovered rebuild");
        assert!(index.current_snapshot().contains("prod/new"));
        assert_eq!(index.status().last_error, None);
    }

    #[tokio::test]
    async fn triggered_rebuild_reports_fresh_progress_immediately() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("rebuild");
        assert_eq!(index.status().progress_percent, 100);

        backend.pause_reads();
        assert_eq!(index.trigger_rebuild(), RebuildTrigger::Accepted);
        let status = index.status();
        assert!(status.rebuilding);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(status.discovered, 0);
        assert_eq!(status.build_duration, Duration::ZERO);

        backend.resume_reads();
        wait_idle(&index).await;
        assert_eq!(index.status().progress_percent, 100);
    }

    #[tokio::test]
    async fn fetches_respect_their_own_pool_size() {
        let backend = Arc::new(InMemoryBackend::new());
        for n in 0..60 {
            backend.insert(format!("bulk/secret-{n}"), json!({"key": n.to_string()}));
        }
        backend.set_latency(Some(Duration::from_millis(5)));
        let index = SecretIndex::new(
            backend.clone(),
            IndexConfig::default().with_concurrency(2, 3),
        );

        let RebuildOutcome::Completed(summary) = index.rebuild_now().await.expect("rebuild") else {
            panic!("expected a completed rebuild");
        };
        assert_eq!(summary.indexed, 60);
        assert_eq!(backend.read_calls(), 60);
        assert_eq!(backend.max_reads_in_flight(), 3);
        assert!(backend.max_lists_in_flight() <= 2);
    }

    #[tokio::test]
    async fn unreadable_secrets_are_skipped() {
        let backend = sample_backend();
        backend.fail_read("prod/api", BackendError::permission_denied("permission denied"));
        backend.fail_read("staging/db", BackendError::with_status(500, "boom"));
        let index = index_for(&backend);

        let RebuildOutcome::Completed(summary) = index.rebuild_now().await.expect("rebuild") else {
            panic!("expected a completed rebuild");
        };
        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.permission_denied, 1);
        assert_eq!(summary.fetch_failures, 1);

        let snapshot = index.current_snapshot();
        assert!(!snapshot.contains("prod/api"));
        assert!(!snapshot.contains("staging/db"));
        assert!(snapshot.contains("prod/db/credentials"));
        assert_eq!(index.status().progress_percent, 50);
    }

    #[tokio::test]
    async fn held_snapshot_is_unaffected_by_rebuild() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("rebuild");
        let held = index.current_snapshot();

        backend.remove("prod/api");
        backend.insert("dev/cache", json!({"url": "redis://"}));
        index.rebuild_now().await.expect("rebuild");

        assert!(held.contains("prod/api"));
        assert!(!held.contains("dev/cache"));
        let fresh = index.current_snapshot();
        assert!(!fresh.contains("prod/api"));
        assert!(fresh.contains("dev/cache"));
    }

    #[tokio::test]
    async fn shutdown_cancels_rebuild() {
        let backend = sample_backend();
        let index = index_for(&backend);
        index.rebuild_now().await.expect("rebuild");
        let before = index.current_snapshot();

        index.shutdown();
        let error = index.rebuild_now().await.expect_err("cancelled");
        assert!(matches!(error, RebuildError::Cancelled));
        assert!(Arc::ptr_eq(&before, &index.current_snapshot()));
        assert!(!index.is_rebuilding());
    }
}
