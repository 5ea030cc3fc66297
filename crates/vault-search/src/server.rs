use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use secret_index::SecretIndex;

use crate::error::{ServiceError, ServiceResult};
use crate::server::openapi::ApiDoc;

pub mod error;
pub mod openapi;
pub mod rebuild;
pub mod search;
pub mod status;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    index: SecretIndex,
}

impl Server {
    /// Binds `listen_addr` and starts serving in the background.
    pub async fn start(listen_addr: &str, index: SecretIndex) -> ServiceResult<Self> {
        let state = Arc::new(ServerState {
            index: index.clone(),
            version: VERSION,
        });
        let app = router(state);
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = result {
                tracing::error!(%error, "http server stopped with an error");
            }
        });
        tracing::info!(%addr, "http server is listening");

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            index,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn index(&self) -> &SecretIndex {
        &self.index
    }

    pub fn shutdown(&mut self) -> Result<(), String> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| "failed to send server shutdown signal".to_string())
        } else {
            Ok(())
        }
    }

    /// Signals shutdown and waits for in-flight requests to drain.
    pub async fn stop(&mut self) {
        if let Err(error) = self.shutdown() {
            tracing::warn!(%error, "server already stopped");
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::error!(%error, "http server task failed");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = Router::new()
        .route("/health", get(health))
        .route("/search", get(search::search))
        .route("/status", get(status::status))
        .route(
            "/rebuild",
            post(rebuild::rebuild).fallback(rebuild::method_not_allowed),
        )
        .route("/openapi.json", get(openapi_json));

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()),
    );

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub(crate) async fn health() -> &'static str {
    "ok"
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub struct ServerState {
    pub(crate) index: SecretIndex,
    pub(crate) version: &'static str,
}
