//! HTTP search service over a Vault KV v2 mount.
//!
//! Wires the `secret-index` cache to Vault and exposes it over HTTP:
//! - Environment configuration and logging setup
//! - A `reqwest` client implementing the index's backend trait
//! - An axum server for search, status, and manual rebuilds

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod vault;

pub use crate::config::{LogConfig, LogFormat, ServiceConfig};
pub use crate::error::{ServiceError, ServiceResult};
pub use crate::server::Server;
pub use crate::vault::VaultClient;
