//! HTTP client for a Vault KV v2 mount.
//!
//! Only the two calls the index needs are implemented: `LIST` on the
//! metadata endpoint and `GET` on the data endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use secret_index::{BackendError, Payload, SecretBackend};

use crate::config::ServiceConfig;
use crate::error::ServiceResult;

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<ReadData>,
}

#[derive(Debug, Deserialize)]
struct ReadData {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    addr: String,
    mount: String,
    token: String,
    namespace: Option<String>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.addr)
            .field("mount", &self.mount)
            .field("namespace", &self.namespace)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl VaultClient {
    pub fn new(config: &ServiceConfig) -> ServiceResult<Self> {
        Self::connect(
            &config.vault_addr,
            &config.mount_point,
            &config.vault_token,
            config.namespace.clone(),
        )
    }

    pub fn connect(
        addr: &str,
        mount: &str,
        token: &str,
        namespace: Option<String>,
    ) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            addr: addr.trim_end_matches('/').to_string(),
            mount: mount.trim_matches('/').to_string(),
            token: token.to_string(),
            namespace,
        })
    }

    fn url(&self, endpoint: &str, path: &str) -> String {
        format!(
            "{}/v1/{}/{}/{}",
            self.addr,
            self.mount,
            endpoint,
            path.trim_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token);
        match &self.namespace {
            Some(namespace) => builder.header(NAMESPACE_HEADER, namespace),
            None => builder,
        }
    }

    /// Sends a request. `Ok(None)` means Vault answered 404.
    async fn send<T>(&self, method: Method, url: String) -> Result<Option<T>, BackendError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .request(method, &url)
            .send()
            .await
            .map_err(|error| BackendError::new(format!("request to {url} failed: {error}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.json::<ErrorResponse>().await.unwrap_or_default();
            let message = if body.errors.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_lowercase()
            } else {
                body.errors.join("; ")
            };
            return Err(BackendError::with_status(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|error| BackendError::new(format!("invalid response from {url}: {error}")))
    }
}

#[async_trait]
impl SecretBackend for VaultClient {
    async fn list(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let method = Method::from_bytes(b"LIST").map_err(|error| BackendError::new(error.to_string()))?;
        let url = self.url("metadata", path);
        let listing = self.send::<ListResponse>(method, url).await?;
        Ok(listing.map(|listing| listing.data.keys).unwrap_or_default())
    }

    async fn read(&self, path: &str) -> Result<Option<Payload>, BackendError> {
        let url = self.url("data", path);
        let secret = self.send::<ReadResponse>(Method::GET, url).await?;
        let fields = secret
            .and_then(|secret| secret.data)
            .and_then(|data| data.data)
            .filter(|value| !value.is_null());
        Ok(fields.map(Payload::from))
    }
}
