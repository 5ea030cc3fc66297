//! Index build state and progress tracking.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::shared::IndexShared;

/// Index build state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum BuildState {
    Idle = 0,
    Building = 1,
}

impl BuildState {
    /// Loads the state from an atomic.
    pub fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Acquire) {
            1 => Self::Building,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
        }
    }
}

/// Holds the single-flight slot for one rebuild.
///
/// Only [`BuildGuard::acquire`] moves the state to `Building`, and dropping the
/// guard is the only way back to `Idle`, so the flag is released on success,
/// failure, cancellation and panic alike.
#[derive(Debug)]
pub struct BuildGuard {
    shared: Arc<IndexShared>,
}

impl BuildGuard {
    /// Attempts the `Idle -> Building` transition. Returns `None` if another
    /// rebuild already holds the slot.
    pub fn acquire(shared: &Arc<IndexShared>) -> Option<Self> {
        shared
            .build_state
            .compare_exchange(
                BuildState::Idle as u8,
                BuildState::Building as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self {
                shared: shared.clone(),
            })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.shared
            .build_state
            .store(BuildState::Idle as u8, Ordering::Release);
    }
}

/// Counters for the rebuild in progress (or the last one that ran).
#[derive(Debug, Default)]
pub struct BuildProgress {
    /// Leaf paths seen so far. Grows while the walk is running.
    pub discovered: AtomicU64,
    /// Secrets read and indexed successfully.
    pub fetched: AtomicU64,
    pub keys_indexed: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub permission_denied: AtomicU64,
}

impl BuildProgress {
    /// Resets progress for a new build.
    pub fn reset_for_build(&self) {
        self.discovered.store(0, Ordering::Relaxed);
        self.fetched.store(0, Ordering::Relaxed);
        self.keys_indexed.store(0, Ordering::Relaxed);
        self.fetch_failures.store(0, Ordering::Relaxed);
        self.permission_denied.store(0, Ordering::Relaxed);
    }

    /// Puts back the counters of an earlier build.
    pub fn restore(&self, values: &ProgressSnapshot) {
        self.discovered.store(values.discovered, Ordering::Relaxed);
        self.fetched.store(values.fetched, Ordering::Relaxed);
        self.keys_indexed.store(values.keys_indexed, Ordering::Relaxed);
        self.fetch_failures.store(values.fetch_failures, Ordering::Relaxed);
        self.permission_denied.store(values.permission_denied, Ordering::Relaxed);
    }

    /// Takes a snapshot of the progress values.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            keys_indexed: self.keys_indexed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            permission_denied: self.permission_denied.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of build progress values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub discovered: u64,
    pub fetched: u64,
    pub keys_indexed: u64,
    pub fetch_failures: u64,
    pub permission_denied: u64,
}

impl ProgressSnapshot {
    /// `fetched / discovered * 100`, or 0 before anything was discovered.
    pub fn percent(&self) -> u64 {
        if self.discovered == 0 {
            0
        } else {
            self.fetched.saturating_mul(100) / self.discovered
        }
    }
}

/// Wall-clock bookkeeping for builds.
#[derive(Debug, Default, Clone)]
pub struct BuildTimings {
    /// Start of the rebuild currently running, if any.
    pub current_started: Option<Instant>,
    pub last_completed: Option<CompletedBuild>,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletedBuild {
    pub started: Instant,
    pub finished: Instant,
    pub finished_at: DateTime<Utc>,
}

impl CompletedBuild {
    pub fn duration(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }
}

const STATUS_ROUNDING_SECS: u64 = 10;

/// Rounds to the nearest multiple of ten seconds (halves round up).
pub fn round_to_ten_seconds(duration: Duration) -> Duration {
    let millis = duration.as_millis() as u64;
    let step = STATUS_ROUNDING_SECS * 1000;
    let rounded = (millis + step / 2) / step * STATUS_ROUNDING_SECS;
    Duration::from_secs(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_goes_to_nearest_ten_seconds() {
        assert_eq!(round_to_ten_seconds(Duration::from_secs(0)), Duration::ZERO);
        assert_eq!(round_to_ten_seconds(Duration::from_secs(4)), Duration::ZERO);
        assert_eq!(round_to_ten_seconds(Duration::from_secs(5)), Duration::from_secs(10));
        assert_eq!(round_to_ten_seconds(Duration::from_millis(14_900)), Duration::from_secs(10));
        assert_eq!(round_to_ten_seconds(Duration::from_secs(16)), Duration::from_secs(20));
        assert_eq!(round_to_ten_seconds(Duration::from_secs(125)), Duration::from_secs(130));
    }

    #[test]
    fn percent_is_zero_without_discoveries() {
        let progress = ProgressSnapshot::default();
        assert_eq!(progress.percent(), 0);

        let progress = ProgressSnapshot {
            discovered: 8,
            fetched: 2,
            ..ProgressSnapshot::default()
        };
        assert_eq!(progress.percent(), 25);
    }

    #[test]
    fn guard_is_single_flight_and_releases_on_drop() {
        let shared = Arc::new(IndexShared::default());
        let guard = BuildGuard::acquire(&shared).expect("first acquire");
        assert_eq!(BuildState::load(&shared.build_state), BuildState::Building);
        assert!(BuildGuard::acquire(&shared).is_none());

        drop(guard);
        assert_eq!(BuildState::load(&shared.build_state), BuildState::Idle);
        assert!(BuildGuard::acquire(&shared).is_some());
    }
}
