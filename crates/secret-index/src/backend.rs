//! The secret store seen by the indexer.
//!
//! The index only needs two calls: LIST a collection and READ a secret's
//! fields. Paths passed in are relative to the mount and never start with `/`.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::extract::Payload;

pub use memory::InMemoryBackend;

/// Fields of one secret, keyed by field name.
pub type SecretFields = BTreeMap<String, Payload>;

#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Lists the children of a collection. Names ending in `/` are
    /// sub-collections; all other names are secrets.
    ///
    /// A collection with no children returns an empty list.
    async fn list(&self, path: &str) -> Result<Vec<String>, BackendError>;

    /// Reads a secret's fields. `Ok(None)` means the backend returned no data.
    async fn read(&self, path: &str) -> Result<Option<Payload>, BackendError>;
}

/// Joins a collection path and a child name without doubling separators.
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}
