//! Immutable path -> record mapping published after each successful rebuild.

use std::collections::hash_map;
use std::collections::HashMap;
use std::mem::size_of;

use chrono::{DateTime, Utc};

use crate::types::SecretRecord;

/// Rough per-entry cost of the map itself: the owned key, the record, and
/// the table's hash/control bytes.
const ENTRY_OVERHEAD_BYTES: usize =
    size_of::<String>() + size_of::<SecretRecord>() + size_of::<u64>() + 1;

/// A published index. Never mutated once built.
#[derive(Debug, Default)]
pub struct Snapshot {
    records: HashMap<String, SecretRecord>,
    built_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(records: HashMap<String, SecretRecord>) -> Self {
        Self {
            records,
            built_at: Some(Utc::now()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&SecretRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, SecretRecord> {
        self.records.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn keys_indexed(&self) -> usize {
        self.records.values().map(|record| record.all_keys.len()).sum()
    }

    /// Estimated heap footprint: per-entry overhead plus string lengths.
    /// This is an approximation, not an exact measurement.
    pub fn approx_size_bytes(&self) -> u64 {
        let mut size = size_of::<Self>();
        for (path, record) in &self.records {
            size += ENTRY_OVERHEAD_BYTES;
            size += path.len();
            size += record.search_string.len();
            size += record.all_keys.len() * size_of::<String>();
            size += record.all_keys.iter().map(String::len).sum::<usize>();
        }
        size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keys: &[&str], search: &str) -> SecretRecord {
        SecretRecord::new(
            keys.iter().map(|key| key.to_string()).collect(),
            search.to_string(),
        )
    }

    #[test]
    fn empty_snapshot_has_only_base_size() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.approx_size_bytes(), size_of::<Snapshot>() as u64);
        assert!(snapshot.built_at().is_none());
    }

    #[test]
    fn size_grows_with_string_lengths() {
        let small = Snapshot::new(HashMap::from([(
            "a".to_string(),
            record(&["k"], "a k"),
        )]));
        let large = Snapshot::new(HashMap::from([(
            "a/much/longer/path".to_string(),
            record(&["username", "password"], "a/much/longer/path username password"),
        )]));

        assert!(large.approx_size_bytes() > small.approx_size_bytes());
        let expected_small = size_of::<Snapshot>() + ENTRY_OVERHEAD_BYTES + 1 + 3 + size_of::<String>() + 1;
        assert_eq!(small.approx_size_bytes(), expected_small as u64);
        assert_eq!(large.keys_indexed(), 2);
    }
}
