use std::time::Duration;

use crate::extract::DEFAULT_MAX_NESTED_DEPTH;

pub const DEFAULT_CONCURRENCY: usize = 15;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for one [`SecretIndex`](crate::SecretIndex).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Upper bound on concurrent LIST calls across the whole tree walk.
    pub list_concurrency: usize,
    /// Upper bound on concurrent READ calls during a rebuild.
    pub fetch_concurrency: usize,
    pub search_timeout: Duration,
    /// Prefix used when a search asks for decorated results.
    pub ui_base_url: String,
    pub max_nested_depth: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            list_concurrency: DEFAULT_CONCURRENCY,
            fetch_concurrency: DEFAULT_CONCURRENCY,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            ui_base_url: String::new(),
            max_nested_depth: DEFAULT_MAX_NESTED_DEPTH,
        }
    }
}

impl IndexConfig {
    pub fn with_concurrency(mut self, list: usize, fetch: usize) -> Self {
        self.list_concurrency = list.max(1);
        self.fetch_concurrency = fetch.max(1);
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn with_ui_base_url(mut self, base: impl Into<String>) -> Self {
        self.ui_base_url = base.into();
        self
    }
}
