//! In-memory key index over a hierarchical secret store.
//!
//! This crate provides the core search cache:
//! - A bounded-concurrency walk of the secret tree
//! - Key extraction from nested and embedded JSON/YAML payloads
//! - Single-flight rebuilds that publish immutable snapshots
//! - Term, regex, and path-segment search with a timeout

pub mod backend;
pub mod cancel;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod search;
pub mod types;

mod manager;

// Re-export main types
pub use backend::{join_path, InMemoryBackend, SecretBackend, SecretFields};
pub use config::{IndexConfig, DEFAULT_CONCURRENCY, DEFAULT_SEARCH_TIMEOUT};
pub use enumerate::{EnumerationSummary, Enumerator};
pub use error::{BackendError, EnumerationError, RebuildError, SearchError, SearchResult};
pub use extract::{KeyExtractor, Payload, DEFAULT_MAX_NESTED_DEPTH};
pub use indexer::Snapshot;
pub use manager::SecretIndex;
pub use types::{
    CacheStatus, RebuildOutcome, RebuildSummary, RebuildTrigger, SearchCriteria, SecretRecord,
    SortDirection,
};
