//! In-memory [`SecretBackend`] for tests and local experiments.
//!
//! Holds a flat map of secret path to payload and derives collection listings
//! from it. Failures, permission denials and latency can be scripted per path,
//! and the highest number of concurrent LIST and READ calls is recorded so
//! callers can check concurrency bounds.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use super::SecretBackend;
use crate::error::BackendError;
use crate::extract::Payload;

#[derive(Debug)]
pub struct InMemoryBackend {
    secrets: RwLock<BTreeMap<String, Payload>>,
    list_failures: RwLock<HashMap<String, BackendError>>,
    read_failures: RwLock<HashMap<String, BackendError>>,
    latency: RwLock<Option<Duration>>,
    reads_paused: watch::Sender<bool>,
    lists_in_flight: AtomicUsize,
    max_lists_in_flight: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
    list_calls: AtomicU64,
    read_calls: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (reads_paused, _) = watch::channel(false);
        Self {
            secrets: RwLock::new(BTreeMap::new()),
            list_failures: RwLock::new(HashMap::new()),
            read_failures: RwLock::new(HashMap::new()),
            latency: RwLock::new(None),
            reads_paused,
            lists_in_flight: AtomicUsize::new(0),
            max_lists_in_flight: AtomicUsize::new(0),
            reads_in_flight: AtomicUsize::new(0),
            max_reads_in_flight: AtomicUsize::new(0),
            list_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
        }
    }

    /// Builds a backend from `(path, json fields)` pairs.
    pub fn with_secrets<I, P>(secrets: I) -> Self
    where
        I: IntoIterator<Item = (P, serde_json::Value)>,
        P: Into<String>,
    {
        let backend = Self::new();
        for (path, fields) in secrets {
            backend.insert(path, fields);
        }
        backend
    }

    pub fn insert(&self, path: impl Into<String>, fields: serde_json::Value) {
        let path = path.into().trim_matches('/').to_string();
        self.secrets.write().insert(path, Payload::from(fields));
    }

    pub fn remove(&self, path: &str) {
        self.secrets.write().remove(path.trim_matches('/'));
    }

    /// Makes LIST of the given collection fail.
    pub fn fail_list(&self, path: &str, error: BackendError) {
        self.list_failures
            .write()
            .insert(path.trim_matches('/').to_string(), error);
    }

    /// Makes READ of the given secret fail.
    pub fn fail_read(&self, path: &str, error: BackendError) {
        self.read_failures
            .write()
            .insert(path.trim_matches('/').to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.list_failures.write().clear();
        self.read_failures.write().clear();
    }

    /// Adds a fixed delay to every LIST and READ.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Blocks READ calls until [`resume_reads`](Self::resume_reads).
    pub fn pause_reads(&self) {
        self.reads_paused.send_replace(true);
    }

    pub fn resume_reads(&self) {
        self.reads_paused.send_replace(false);
    }

    pub fn max_lists_in_flight(&self) -> usize {
        self.max_lists_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn children_of(&self, collection: &str) -> Vec<String> {
        let prefix = if collection.is_empty() {
            String::new()
        } else {
            format!("{collection}/")
        };
        let mut children = BTreeSet::new();
        for path in self.secrets.read().keys() {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => children.insert(format!("{dir}/")),
                None => children.insert(rest.to_string()),
            };
        }
        children.into_iter().collect()
    }
}

/// Decrements an in-flight counter when dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn list(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.lists_in_flight, &self.max_lists_in_flight);

        self.simulate_latency().await;

        let collection = path.trim_matches('/');
        if let Some(error) = self.list_failures.read().get(collection).cloned() {
            return Err(error);
        }
        Ok(self.children_of(collection))
    }

    async fn read(&self, path: &str) -> Result<Option<Payload>, BackendError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.reads_in_flight, &self.max_reads_in_flight);
        let mut paused = self.reads_paused.subscribe();
        // The sender lives as long as self, so this only errors during teardown.
        let _ = paused.wait_for(|paused| !*paused).await;

        self.simulate_latency().await;

        let path = path.trim_matches('/');
        if let Some(error) = self.read_failures.read().get(path).cloned() {
            return Err(error);
        }
        Ok(self.secrets.read().get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn listing_derives_collections_and_leaves() {
        let backend = InMemoryBackend::with_secrets([
            ("prod/db/credentials", json!({ "user": "a" })),
            ("prod/api", json!({ "token": "b" })),
            ("staging/db", json!({ "user": "c" })),
        ]);

        assert_eq!(backend.list("").await.expect("root"), vec!["prod/", "staging/"]);
        assert_eq!(backend.list("prod").await.expect("prod"), vec!["api", "db/"]);
        assert!(backend.list("missing").await.expect("missing").is_empty());
    }

    #[tokio::test]
    async fn scripted_failures_are_returned() {
        let backend = InMemoryBackend::with_secrets([("prod/db", json!({ "user": "a" }))]);
        backend.fail_read("prod/db", BackendError::permission_denied("permission denied"));
        backend.fail_list("prod", BackendError::with_status(500, "boom"));

        let read = backend.read("prod/db").await.expect_err("read fails");
        assert!(read.is_permission_denied());
        let list = backend.list("prod").await.expect_err("list fails");
        assert_eq!(list.status(), Some(500));
    }
}
