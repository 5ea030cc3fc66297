//! Search over the published snapshot.
//!
//! This module provides:
//! - Criteria compilation (term or regex, plus an optional path filter)
//! - Parallel content and path scans with timeout-driven cancellation

mod engine;
mod path;

pub use engine::{search_snapshot, CompiledSearch};
pub use path::PathSegmentMatcher;
