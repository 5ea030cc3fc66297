//! Shared cache state.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::build::{
    round_to_ten_seconds, BuildProgress, BuildState, BuildTimings, CompletedBuild,
    ProgressSnapshot,
};
use super::snapshot::Snapshot;
use crate::types::CacheStatus;

/// Everything the rebuild writes and searches/status read.
///
/// The published snapshot sits behind its own lock and is only ever replaced
/// wholesale; readers clone the `Arc` and never hold the lock while working.
#[derive(Debug)]
pub struct IndexShared {
    /// Current build state (atomic for lock-free reads).
    pub build_state: AtomicU8,
    /// Counters for the rebuild in progress. Between rebuilds they match
    /// `published`.
    pub progress: BuildProgress,
    /// Counters of the build that produced the served snapshot.
    pub published: Mutex<ProgressSnapshot>,
    pub timings: Mutex<BuildTimings>,
    /// Why the most recent rebuild failed, if it did.
    pub last_error: Mutex<Option<String>>,
    pub snapshot: RwLock<Arc<Snapshot>>,
}

impl Default for IndexShared {
    fn default() -> Self {
        Self {
            build_state: AtomicU8::new(BuildState::Idle as u8),
            progress: BuildProgress::default(),
            published: Mutex::new(ProgressSnapshot::default()),
            timings: Mutex::new(BuildTimings::default()),
            last_error: Mutex::new(None),
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }
}

impl IndexShared {
    pub fn is_rebuilding(&self) -> bool {
        BuildState::load(&self.build_state) == BuildState::Building
    }

    /// Returns the published snapshot. The caller keeps it alive for as long
    /// as it needs, independent of later rebuilds.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Records the start of a rebuild and zeroes the per-rebuild counters.
    pub fn begin_build(&self) -> Instant {
        let started = Instant::now();
        self.progress.reset_for_build();
        self.timings.lock().current_started = Some(started);
        started
    }

    /// Swaps in a freshly built snapshot and records the build as completed.
    pub fn publish(&self, snapshot: Snapshot, started: Instant) -> CompletedBuild {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write() = snapshot;

        *self.published.lock() = self.progress.snapshot();

        let completed = CompletedBuild {
            started,
            finished: Instant::now(),
            finished_at: Utc::now(),
        };
        {
            let mut timings = self.timings.lock();
            timings.current_started = None;
            timings.last_completed = Some(completed);
        }
        *self.last_error.lock() = None;
        completed
    }

    /// Ends a rebuild without touching the published snapshot. The counters
    /// go back to the ones describing that snapshot.
    pub fn abandon_build(&self, reason: String) {
        let published = *self.published.lock();
        self.progress.restore(&published);
        self.timings.lock().current_started = None;
        *self.last_error.lock() = Some(reason);
    }

    pub fn status(&self) -> CacheStatus {
        let now = Instant::now();
        let rebuilding = self.is_rebuilding();
        let timings = self.timings.lock().clone();
        let progress = if rebuilding {
            self.progress.snapshot()
        } else {
            *self.published.lock()
        };
        let snapshot = self.current_snapshot();

        let build_duration = match (rebuilding, timings.current_started, timings.last_completed) {
            (true, Some(started), _) => round_to_ten_seconds(now.saturating_duration_since(started)),
            (_, _, Some(completed)) => completed.duration(),
            _ => Duration::ZERO,
        };
        let cache_age = timings
            .last_completed
            .map(|completed| now.saturating_duration_since(completed.finished));

        CacheStatus {
            rebuilding,
            build_duration,
            cache_age,
            last_built_at: timings.last_completed.map(|completed| completed.finished_at),
            approx_size_bytes: snapshot.approx_size_bytes(),
            indexed_secrets: snapshot.len(),
            discovered: progress.discovered,
            fetched: progress.fetched,
            keys_indexed: progress.keys_indexed,
            fetch_failures: progress.fetch_failures,
            permission_denied: progress.permission_denied,
            progress_percent: progress.percent(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::indexer::build::BuildGuard;
    use crate::types::SecretRecord;

    #[test]
    fn fresh_state_reports_empty_idle_cache() {
        let shared = IndexShared::default();
        let status = shared.status();
        assert!(!status.rebuilding);
        assert_eq!(status.build_duration, Duration::ZERO);
        assert_eq!(status.cache_age, None);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(status.indexed_secrets, 0);
    }

    #[test]
    fn publish_replaces_snapshot_and_clears_error() {
        let shared = IndexShared::default();
        let before = shared.current_snapshot();
        shared.abandon_build("boom".to_string());
        assert_eq!(shared.status().last_error.as_deref(), Some("boom"));

        let started = shared.begin_build();
        let records = HashMap::from([(
            "prod/db".to_string(),
            SecretRecord::new(vec!["user".to_string()], "prod/db user".to_string()),
        )]);
        shared.publish(Snapshot::new(records), started);

        let after = shared.current_snapshot();
        assert!(before.is_empty(), "earlier readers keep their snapshot");
        assert_eq!(after.len(), 1);
        let status = shared.status();
        assert_eq!(status.last_error, None);
        assert!(status.cache_age.is_some());
        assert!(status.last_built_at.is_some());
    }

    #[test]
    fn status_reports_live_progress_while_building() {
        let shared = Arc::new(IndexShared::default());
        let _guard = BuildGuard::acquire(&shared).expect("acquire");
        shared.begin_build();
        shared.progress.discovered.store(10, Ordering::Relaxed);
        shared.progress.fetched.store(4, Ordering::Relaxed);

        let status = shared.status();
        assert!(status.rebuilding);
        assert_eq!(status.progress_percent, 40);
        assert_eq!(status.build_duration, Duration::ZERO);
    }

    #[test]
    fn abandoned_build_reports_published_counters() {
        let shared = Arc::new(IndexShared::default());
        let started = shared.begin_build();
        shared.progress.discovered.store(2, Ordering::Relaxed);
        shared.progress.fetched.store(2, Ordering::Relaxed);
        shared.progress.keys_indexed.store(3, Ordering::Relaxed);
        shared.publish(Snapshot::empty(), started);

        let guard = BuildGuard::acquire(&shared).expect("acquire");
        shared.begin_build();
        shared.progress.discovered.store(1, Ordering::Relaxed);
        assert_eq!(shared.status().discovered, 1);

        shared.abandon_build("listing failed".to_string());
        drop(guard);

        let status = shared.status();
        assert_eq!(status.discovered, 2);
        assert_eq!(status.fetched, 2);
        assert_eq!(status.keys_indexed, 3);
        assert_eq!(status.progress_percent, 100);
        assert_eq!(status.last_error.as_deref(), Some("listing failed"));
    }
}
