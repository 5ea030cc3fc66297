//! Cache building and publication.
//!
//! This module handles everything between the backend and the searchable
//! snapshot:
//! - Single-flight build state and live progress counters
//! - The rebuild pipeline (walk, fetch, extract)
//! - Atomic publication of immutable snapshots

mod build;
mod rebuild;
mod shared;
mod snapshot;

pub use build::{round_to_ten_seconds, BuildGuard, BuildProgress, BuildState, ProgressSnapshot};
pub(crate) use rebuild::RebuildJob;
pub use shared::IndexShared;
pub use snapshot::Snapshot;
