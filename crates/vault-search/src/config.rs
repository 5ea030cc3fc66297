//! Service configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secret_index::IndexConfig;

use crate::error::ServiceError;

pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";
pub const DEFAULT_MOUNT_POINT: &str = "kv";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONCURRENCY: usize = 15;
/// Used when `MAX_CONCURRENCY` is set but unusable.
pub const FALLBACK_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub vault_addr: String,
    pub vault_token: String,
    pub mount_point: String,
    pub namespace: Option<String>,
    pub ui_base_url: String,
    pub listen_addr: String,
    pub list_concurrency: usize,
    pub fetch_concurrency: usize,
    pub search_timeout: Duration,
    pub log: LogConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let vault_token = read("VAULT_TOKEN").ok_or(ServiceError::MissingEnv("VAULT_TOKEN"))?;
        let vault_addr = read("VAULT_ADDR")
            .unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string())
            .trim_end_matches('/')
            .to_string();
        let mount_point = read("VAULT_MOUNT_POINT")
            .unwrap_or_else(|| DEFAULT_MOUNT_POINT.to_string())
            .trim_matches('/')
            .to_string();
        let ui_base_url = read("VAULT_UI_BASE")
            .unwrap_or_else(|| default_ui_base(&vault_addr, &mount_point));

        let list_concurrency = read_limit(
            read("MAX_CONCURRENCY").or_else(|| read("MAX_GOROUTINES")),
            DEFAULT_MAX_CONCURRENCY,
        );
        let fetch_concurrency = read_limit(read("FETCH_CONCURRENCY"), list_concurrency);
        let search_timeout = Duration::from_secs(
            read("SEARCH_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS),
        );

        let format = match read("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("plain") | Some("text") => LogFormat::Plain,
            Some(other) => return Err(ServiceError::InvalidEnv("LOG_FORMAT", other.to_string())),
        };

        Ok(Self {
            vault_addr,
            vault_token,
            mount_point,
            namespace: read("VAULT_NAMESPACE"),
            ui_base_url,
            listen_addr: read("LOCAL_SERVER_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            list_concurrency,
            fetch_concurrency,
            search_timeout,
            log: LogConfig {
                level: read("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format,
                file_path: read("LOG_FILE_PATH").map(PathBuf::from),
            },
        })
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::default()
            .with_concurrency(self.list_concurrency, self.fetch_concurrency)
            .with_search_timeout(self.search_timeout)
            .with_ui_base_url(self.ui_base_url.clone())
    }
}

pub fn default_ui_base(vault_addr: &str, mount_point: &str) -> String {
    format!("{vault_addr}/ui/vault/secrets/{mount_point}/show")
}

/// Parses a positive limit. Unset yields `default`; set but unusable yields
/// [`FALLBACK_MAX_CONCURRENCY`].
fn read_limit(raw: Option<String>, default: usize) -> usize {
    match raw {
        None => default,
        Some(value) => value
            .parse::<usize>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(FALLBACK_MAX_CONCURRENCY),
    }
}
