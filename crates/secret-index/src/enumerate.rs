//! Recursive listing of the secret tree.
//!
//! The walk fans out one task per collection. Every task takes a permit from a
//! single semaphore shared by the whole walk before calling LIST, so the number
//! of in-flight listings never exceeds the configured bound no matter how deep
//! or wide the tree is. Permits are held only for the LIST call itself, which
//! keeps a parent from starving its own children.
//!
//! All tasks live in one `JoinSet` owned by [`Enumerator::run`]; the walk only
//! returns once every spawned listing has finished, and dropping the future
//! aborts whatever is still running.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{join_path, SecretBackend};
use crate::error::{BackendError, EnumerationError};

/// Counts reported by a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSummary {
    pub leaves: u64,
    pub collections: u64,
    pub cancelled: bool,
}

#[derive(Debug)]
enum ListOutcome {
    Listed(Vec<String>),
    Failed(BackendError),
    Skipped,
}

#[derive(Debug)]
struct Listing {
    path: String,
    outcome: ListOutcome,
}

/// Walks the backend tree and streams leaf paths.
#[derive(Clone)]
pub struct Enumerator {
    backend: Arc<dyn SecretBackend>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Enumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumerator")
            .field("available_permits", &self.permits.available_permits())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Enumerator {
    pub fn new(backend: Arc<dyn SecretBackend>, concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel,
        }
    }

    /// Lists everything under `root` and sends each leaf path to `leaves`.
    ///
    /// A failed LIST does not stop the walk: other branches keep going and the
    /// first failure is returned once everything has drained. Leaves found
    /// before or after the failure are still sent.
    pub async fn run(
        &self,
        root: &str,
        leaves: mpsc::Sender<String>,
    ) -> Result<EnumerationSummary, EnumerationError> {
        let mut tasks = JoinSet::new();
        let mut summary = EnumerationSummary::default();
        let mut first_error: Option<EnumerationError> = None;
        let mut receiver_closed = false;

        self.spawn_listing(&mut tasks, root.trim_matches('/').to_string());

        while let Some(joined) = tasks.join_next().await {
            let listing = match joined {
                Ok(listing) => listing,
                Err(join_error) => {
                    log::error!("secret listing task failed: {}", join_error);
                    first_error.get_or_insert_with(|| EnumerationError {
                        path: String::new(),
                        source: BackendError::new(format!("listing task failed: {join_error}")),
                    });
                    continue;
                }
            };

            let children = match listing.outcome {
                ListOutcome::Listed(children) => children,
                ListOutcome::Skipped => {
                    summary.cancelled = true;
                    continue;
                }
                ListOutcome::Failed(error) => {
                    log::error!(
                        "failed to list secrets current_path={} error={}",
                        listing.path,
                        error
                    );
                    first_error.get_or_insert(EnumerationError {
                        path: listing.path,
                        source: error,
                    });
                    continue;
                }
            };

            for child in children {
                if child.trim_matches('/').is_empty() {
                    continue;
                }
                if child.ends_with('/') {
                    if receiver_closed || self.cancel.is_cancelled() {
                        summary.cancelled = true;
                        continue;
                    }
                    let collection = join_path(&listing.path, &child)
                        .trim_end_matches('/')
                        .to_string();
                    summary.collections += 1;
                    self.spawn_listing(&mut tasks, collection);
                } else {
                    if receiver_closed {
                        continue;
                    }
                    let leaf = join_path(&listing.path, &child);
                    log::debug!("found secret secret_path={}", leaf);
                    if leaves.send(leaf).await.is_err() {
                        receiver_closed = true;
                        continue;
                    }
                    summary.leaves += 1;
                }
            }
        }

        if self.cancel.is_cancelled() {
            summary.cancelled = true;
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    }

    fn spawn_listing(&self, tasks: &mut JoinSet<Listing>, path: String) {
        let backend = self.backend.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        tasks.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return Listing {
                    path,
                    outcome: ListOutcome::Skipped,
                };
            };
            if cancel.is_cancelled() {
                return Listing {
                    path,
                    outcome: ListOutcome::Skipped,
                };
            }

            log::debug!("listing secrets current_path={}", path);
            let outcome = match backend.list(&path).await {
                Ok(children) => ListOutcome::Listed(children),
                Err(error) => ListOutcome::Failed(error),
            };
            Listing { path, outcome }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::InMemoryBackend;

    async fn collect(
        backend: Arc<InMemoryBackend>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> (Result<EnumerationSummary, EnumerationError>, Vec<String>) {
        let enumerator = Enumerator::new(backend, concurrency, cancel);
        let (tx, mut rx) = mpsc::channel(4096);
        let result = enumerator.run("", tx).await;
        let mut leaves = Vec::new();
        while let Some(leaf) = rx.recv().await {
            leaves.push(leaf);
        }
        leaves.sort();
        (result, leaves)
    }

    fn wide_tree(teams: usize, envs: usize, apps: usize) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        for team in 0..teams {
            for env in 0..envs {
                for app in 0..apps {
                    backend.insert(
                        format!("team{team}/env{env}/app{app}"),
                        json!({ "token": "x" }),
                    );
                }
            }
        }
        backend
    }

    #[tokio::test]
    async fn emits_every_leaf_once() {
        let backend = Arc::new(InMemoryBackend::with_secrets([
            ("prod/db/credentials", json!({ "user": "a" })),
            ("prod/api", json!({ "token": "b" })),
            ("staging/deep/er/still/secret", json!({ "k": "v" })),
            ("top", json!({ "k": "v" })),
        ]));

        let (result, leaves) = collect(backend, 4, CancellationToken::new()).await;
        let summary = result.expect("walk succeeds");

        assert_eq!(
            leaves,
            vec![
                "prod/api",
                "prod/db/credentials",
                "staging/deep/er/still/secret",
                "top"
            ]
        );
        assert_eq!(summary.leaves, 4);
        assert_eq!(summary.collections, 6);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn in_flight_listings_never_exceed_bound() {
        let backend = Arc::new(wide_tree(6, 4, 3));
        backend.set_latency(Some(Duration::from_millis(5)));

        let (result, leaves) = collect(backend.clone(), 3, CancellationToken::new()).await;

        result.expect("walk succeeds");
        assert_eq!(leaves.len(), 6 * 4 * 3);
        assert!(backend.max_lists_in_flight() <= 3, "saw {}", backend.max_lists_in_flight());
        assert!(backend.max_lists_in_flight() >= 1);
    }

    #[tokio::test]
    async fn deep_tree_does_not_deadlock_with_single_permit() {
        let backend = Arc::new(InMemoryBackend::with_secrets([(
            "a/b/c/d/e/f/g/h/i/j/k/l/secret",
            json!({ "k": "v" }),
        )]));

        let (result, leaves) = collect(backend, 1, CancellationToken::new()).await;

        result.expect("walk succeeds");
        assert_eq!(leaves, vec!["a/b/c/d/e/f/g/h/i/j/k/l/secret"]);
    }

    #[tokio::test]
    async fn listing_failure_is_reported_after_best_effort_walk() {
        let backend = Arc::new(InMemoryBackend::with_secrets([
            ("prod/db", json!({ "user": "a" })),
            ("staging/db", json!({ "user": "b" })),
            ("staging/api", json!({ "token": "c" })),
        ]));
        backend.fail_list("prod", BackendError::with_status(500, "internal error"));

        let (result, leaves) = collect(backend, 2, CancellationToken::new()).await;

        let error = result.expect_err("walk reports failure");
        assert_eq!(error.path, "prod");
        assert_eq!(error.source.status(), Some(500));
        assert_eq!(leaves, vec!["staging/api", "staging/db"]);
    }

    #[tokio::test]
    async fn cancelled_walk_starts_no_listings() {
        let backend = Arc::new(wide_tree(2, 2, 2));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (result, leaves) = collect(backend.clone(), 2, cancel).await;

        let summary = result.expect("cancellation is not an error");
        assert!(summary.cancelled);
        assert!(leaves.is_empty());
        assert_eq!(backend.list_calls(), 0);
    }

    #[tokio::test]
    async fn empty_backend_yields_nothing() {
        let backend = Arc::new(InMemoryBackend::new());
        let (result, leaves) = collect(backend, 2, CancellationToken::new()).await;
        assert_eq!(result.expect("walk succeeds").leaves, 0);
        assert!(leaves.is_empty());
    }
}
