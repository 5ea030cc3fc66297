//! Rebuild orchestration: walk, fetch, extract, publish.
//!
//! The walk streams leaf paths over a channel. Each path gets its own fetch
//! task, bounded by a semaphore that is independent from the walk's. Fetch
//! results land in a private map behind its own mutex; nothing becomes
//! visible to searches until the whole rebuild succeeds and the map is
//! swapped in as the new snapshot.
//!
//! Per-secret failures never abort a rebuild. A failed LIST anywhere in the
//! tree does: the partial map is discarded and the previous snapshot stays.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::build::{BuildGuard, BuildProgress};
use super::shared::IndexShared;
use super::snapshot::Snapshot;
use crate::backend::SecretBackend;
use crate::enumerate::Enumerator;
use crate::error::{BackendError, EnumerationError, RebuildError};
use crate::extract::{KeyExtractor, Payload};
use crate::types::{RebuildSummary, SecretRecord};

/// Paths buffered between the walk and the fetch loop.
const PATH_CHANNEL_CAPACITY: usize = 1000;

/// How often fetch progress is logged.
const PROGRESS_LOG_EVERY: u64 = 100;

type PendingRecords = Arc<Mutex<HashMap<String, SecretRecord>>>;

/// Everything one rebuild needs, cloned out of the owning index.
#[derive(Clone)]
pub(crate) struct RebuildJob {
    pub shared: Arc<IndexShared>,
    pub backend: Arc<dyn SecretBackend>,
    pub extractor: KeyExtractor,
    pub list_concurrency: usize,
    pub fetch_concurrency: usize,
    pub cancel: CancellationToken,
}

impl RebuildJob {
    /// Runs one rebuild while holding the single-flight slot. `started` comes
    /// from [`IndexShared::begin_build`], called when the slot was taken.
    pub(crate) async fn run(
        self,
        _guard: BuildGuard,
        started: Instant,
    ) -> Result<RebuildSummary, RebuildError> {
        log::info!(
            "starting cache rebuild list_concurrency={} fetch_concurrency={}",
            self.list_concurrency,
            self.fetch_concurrency
        );

        let result = self.build(started).await;
        match &result {
            Ok(summary) => log::info!(
                "cache rebuild completed secrets={} total_keys={} fetch_failures={} permission_denied={} elapsed_ms={}",
                summary.indexed,
                summary.keys_indexed,
                summary.fetch_failures,
                summary.permission_denied,
                summary.elapsed.as_millis()
            ),
            Err(error) => {
                log::error!("cache rebuild aborted, keeping previous snapshot: {}", error);
                self.shared.abandon_build(error.to_string());
            }
        }
        result
    }

    async fn build(&self, started: Instant) -> Result<RebuildSummary, RebuildError> {
        let cancel = self.cancel.child_token();
        let (path_tx, mut path_rx) = mpsc::channel::<String>(PATH_CHANNEL_CAPACITY);

        let enumerator = Enumerator::new(self.backend.clone(), self.list_concurrency, cancel.clone());
        let walk = tokio::spawn(async move { enumerator.run("", path_tx).await });

        let pending: PendingRecords = Arc::default();
        let fetch_permits = Arc::new(Semaphore::new(self.fetch_concurrency.max(1)));
        let mut fetches = JoinSet::new();

        while let Some(path) = path_rx.recv().await {
            self.shared.progress.discovered.fetch_add(1, Ordering::Relaxed);

            // Keep draining after cancellation so the walk is never blocked on a full channel.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = fetch_permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                continue;
            };

            let fetch = FetchTask {
                shared: self.shared.clone(),
                backend: self.backend.clone(),
                extractor: self.extractor,
                pending: pending.clone(),
            };
            fetches.spawn(async move {
                let _permit = permit;
                fetch.run(path).await;
            });

            while let Some(finished) = fetches.try_join_next() {
                log_join_failure(finished);
            }
        }

        while let Some(finished) = fetches.join_next().await {
            log_join_failure(finished);
        }

        let walk_result = match walk.await {
            Ok(result) => result,
            Err(join_error) => Err(EnumerationError {
                path: String::new(),
                source: BackendError::new(format!("enumeration task failed: {join_error}")),
            }),
        };
        let walk_summary = walk_result?;

        if walk_summary.cancelled || cancel.is_cancelled() {
            return Err(RebuildError::Cancelled);
        }

        let records = take_pending(pending);
        let snapshot = Snapshot::new(records);
        let indexed = snapshot.len();
        let completed = self.shared.publish(snapshot, started);
        let progress = self.shared.progress.snapshot();

        Ok(RebuildSummary {
            discovered: progress.discovered,
            indexed,
            keys_indexed: progress.keys_indexed,
            fetch_failures: progress.fetch_failures,
            permission_denied: progress.permission_denied,
            elapsed: completed.duration(),
        })
    }
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        log::error!("secret fetch task failed: {}", error);
    }
}

fn take_pending(pending: PendingRecords) -> HashMap<String, SecretRecord> {
    match Arc::try_unwrap(pending) {
        Ok(records) => records.into_inner(),
        Err(still_shared) => std::mem::take(&mut *still_shared.lock()),
    }
}

/// Reads one secret and adds its record to the pending map.
struct FetchTask {
    shared: Arc<IndexShared>,
    backend: Arc<dyn SecretBackend>,
    extractor: KeyExtractor,
    pending: PendingRecords,
}

impl FetchTask {
    async fn run(self, path: String) {
        let progress = &self.shared.progress;
        log::debug!("fetching secret secret_path={}", path);

        let payload = match self.backend.read(&path).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                progress.fetch_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("secret data is empty secret_path={}", path);
                return;
            }
            Err(error) if error.is_permission_denied() => {
                progress.permission_denied.fetch_add(1, Ordering::Relaxed);
                log::warn!("access denied for secret secret_path={} error={}", path, error);
                return;
            }
            Err(error) => {
                progress.fetch_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("failed to read secret secret_path={} error={}", path, error);
                return;
            }
        };

        let Payload::Map(fields) = payload else {
            progress.fetch_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("invalid data format in secret secret_path={}", path);
            return;
        };

        let record = self.extractor.extract_record(&path, &fields);
        let key_count = record.all_keys.len() as u64;
        self.pending.lock().insert(path, record);

        progress.keys_indexed.fetch_add(key_count, Ordering::Relaxed);
        let fetched = progress.fetched.fetch_add(1, Ordering::Relaxed) + 1;
        log_progress(progress, fetched);
    }
}

fn log_progress(progress: &BuildProgress, fetched: u64) {
    let discovered = progress.discovered.load(Ordering::Relaxed);
    if fetched % PROGRESS_LOG_EVERY == 0 || fetched == discovered {
        log::info!(
            "fetched secrets progress fetched_secrets={} total_secrets={}",
            fetched,
            discovered
        );
    }
}
