//! Key extraction from secret payloads.
//!
//! A secret's fields are flattened into the list of every key name reachable
//! from the top-level map. String values that look like embedded JSON or YAML
//! documents are parsed and their keys are collected too, so a field such as
//! `config = "{\"host\": \"db\"}"` indexes both `config` and `host`.
//!
//! Only key names survive extraction; values are never copied out.

use std::collections::BTreeMap;

use crate::types::SecretRecord;

/// Default cap on how deep nested maps, lists and embedded documents are followed.
pub const DEFAULT_MAX_NESTED_DEPTH: usize = 10;

/// A decoded secret value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    pub fn as_map(&self) -> Option<&BTreeMap<String, Payload>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(value) => Self::Number(value.to_string()),
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Payload::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Payload::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_yaml::Value> for Payload {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(value) => Self::Bool(value),
            serde_yaml::Value::Number(value) => Self::Number(value.to_string()),
            serde_yaml::Value::String(value) => Self::String(value),
            serde_yaml::Value::Sequence(items) => {
                Self::List(items.into_iter().map(Payload::from).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Self::Map(
                mapping
                    .into_iter()
                    .filter_map(|(key, value)| {
                        yaml_key_name(key).map(|key| (key, Payload::from(value)))
                    })
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Payload::from(tagged.value),
        }
    }
}

/// Only scalar YAML keys have a sensible name; composite keys are dropped.
fn yaml_key_name(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(key) => Some(key),
        serde_yaml::Value::Number(key) => Some(key.to_string()),
        serde_yaml::Value::Bool(key) => Some(key.to_string()),
        serde_yaml::Value::Tagged(tagged) => yaml_key_name(tagged.value),
        _ => None,
    }
}

/// Walks a payload and collects key names.
#[derive(Debug, Clone, Copy)]
pub struct KeyExtractor {
    max_depth: usize,
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NESTED_DEPTH)
    }
}

impl KeyExtractor {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Returns every key reachable from the top-level fields of a secret.
    pub fn extract_keys(&self, fields: &BTreeMap<String, Payload>) -> Vec<String> {
        let mut keys = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            keys.push(key.clone());
            self.extract_nested(key, value, &mut keys, 0);
        }
        keys
    }

    /// Extracts keys and builds the record stored in the index for `path`.
    pub fn extract_record(&self, path: &str, fields: &BTreeMap<String, Payload>) -> SecretRecord {
        let keys = self.extract_keys(fields);
        let search_string = build_search_string(path, &keys);
        SecretRecord::new(keys, search_string)
    }

    fn extract_nested(&self, parent: &str, value: &Payload, keys: &mut Vec<String>, depth: usize) {
        if depth >= self.max_depth {
            return;
        }
        match value {
            Payload::String(text) => {
                if looks_like_json(text) {
                    self.extract_embedded_json(parent, text, keys, depth + 1);
                } else if looks_like_yaml(text) {
                    self.extract_embedded_yaml(parent, text, keys, depth + 1);
                }
            }
            Payload::Map(map) => self.collect_map(map, keys, depth + 1),
            Payload::List(items) => {
                for item in items {
                    self.extract_nested(parent, item, keys, depth + 1);
                }
            }
            Payload::Null | Payload::Bool(_) | Payload::Number(_) => {}
        }
    }

    fn extract_embedded_json(&self, parent: &str, text: &str, keys: &mut Vec<String>, depth: usize) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(parsed) => self.collect_document(Payload::from(parsed), keys, depth),
            Err(error) => {
                log::debug!(
                    "skipping embedded json key extraction parent_key={} error={}",
                    parent,
                    error
                );
            }
        }
    }

    fn extract_embedded_yaml(&self, parent: &str, text: &str, keys: &mut Vec<String>, depth: usize) {
        match serde_yaml::from_str::<serde_yaml::Value>(text) {
            Ok(parsed) => self.collect_document(Payload::from(parsed), keys, depth),
            Err(error) => {
                log::debug!(
                    "skipping embedded yaml key extraction parent_key={} error={}",
                    parent,
                    error
                );
            }
        }
    }

    /// An embedded document contributes keys from a top-level map, or from the
    /// map elements of a top-level list. Scalars contribute nothing.
    fn collect_document(&self, document: Payload, keys: &mut Vec<String>, depth: usize) {
        match document {
            Payload::Map(map) => self.collect_map(&map, keys, depth),
            Payload::List(items) => {
                for item in &items {
                    if let Some(map) = item.as_map() {
                        self.collect_map(map, keys, depth);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_map(&self, map: &BTreeMap<String, Payload>, keys: &mut Vec<String>, depth: usize) {
        for (key, value) in map {
            keys.push(key.clone());
            self.extract_nested(key, value, keys, depth);
        }
    }
}

/// Returns true when the trimmed text opens like a JSON object or array.
pub fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Returns true when the text has at least one colon and one newline.
pub fn looks_like_yaml(text: &str) -> bool {
    text.contains(':') && text.contains('\n')
}

/// Lowercased path followed by each lowercased key, joined by single spaces.
pub fn build_search_string(path: &str, keys: &[String]) -> String {
    let capacity = path.len() + keys.iter().map(|key| key.len() + 1).sum::<usize>();
    let mut search = String::with_capacity(capacity);
    search.push_str(&path.to_lowercase());
    for key in keys {
        search.push(' ');
        search.push_str(&key.to_lowercase());
    }
    search
}
