//! vault-search entry point.

use std::process::ExitCode;
use std::sync::Arc;

use secret_index::{RebuildOutcome, SecretIndex};
use vault_search::server::VERSION;
use vault_search::{logging, Server, ServiceConfig, ServiceError, ServiceResult, VaultClient};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "vault-search exited with an error");
            eprintln!("vault-search: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ServiceResult<()> {
    let config = ServiceConfig::from_env()?;
    logging::init(&config.log)?;
    tracing::info!(
        version = VERSION,
        vault_addr = %config.vault_addr,
        mount = %config.mount_point,
        list_concurrency = config.list_concurrency,
        fetch_concurrency = config.fetch_concurrency,
        "starting vault-search"
    );

    let client = Arc::new(VaultClient::new(&config)?);
    let index = SecretIndex::new(client, config.index_config());
    let mut server = Server::start(&config.listen_addr, index.clone()).await?;

    tokio::select! {
        result = index.rebuild_now() => match result {
            Ok(RebuildOutcome::Completed(summary)) => tracing::info!(
                secrets = summary.indexed,
                total_keys = summary.keys_indexed,
                "initial cache build finished"
            ),
            Ok(RebuildOutcome::AlreadyInProgress) => {}
            Err(error) => {
                tracing::error!(%error, "initial cache build failed, shutting down");
                server.stop().await;
                return Err(ServiceError::InitialBuild(error));
            }
        },
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received during initial cache build");
            index.shutdown();
            server.stop().await;
            return Ok(());
        }
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    index.shutdown();
    server.stop().await;
    tracing::info!("application has shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
