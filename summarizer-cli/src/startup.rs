//! Process startup: build the gateway, listen, load the backend, serve.

use anyhow::Context;
use std::sync::Arc;
use summarizer_core::config::ServiceConfig;
use summarizer_core::gateway::{self, RequestGateway, SharedGateway};
use summarizer_core::{BackendKind, create_backend};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Run the service until a shutdown signal arrives.
///
/// The listener is bound before the backend loads, so early requests get a
/// "loading" answer instead of a refused connection. A local model that fails
/// to load ends the process; any other backend keeps serving and reports
/// itself unavailable.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let backend = create_backend(&config.backend, &config.deployment)
        .context("Failed to create inference backend")?;
    let kind = backend.describe();
    let gateway: SharedGateway = Arc::new(RequestGateway::new(backend, config.gateway.clone()));

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        backend = %kind,
        name = %gateway.backend().name(),
        gpu = config.deployment.gpu.as_deref().unwrap_or("none"),
        min_containers = config.deployment.min_containers,
        "Starting summarizer"
    );

    let mut server = tokio::spawn(gateway::serve(
        Arc::clone(&gateway),
        listener,
        config.deployment.max_concurrency,
        shutdown_signal(),
    ));

    let loader = {
        let gateway = Arc::clone(&gateway);
        let retry = config.backend.load_retry.clone();
        tokio::spawn(async move { gateway.load_backend(&retry).await })
    };

    tokio::select! {
        served = &mut server => {
            served.context("Server task failed")?.context("Server error")?;
            return Ok(());
        }
        loaded = loader => {
            if let Err(e) = loaded.context("Backend load task failed")? {
                if kind == BackendKind::LocalModel {
                    server.abort();
                    return Err(anyhow::Error::new(e).context("Local model failed to load"));
                }
                warn!(backend = %kind, error = %e, "Serving with an unavailable backend");
            }
        }
    }

    server
        .await
        .context("Server task failed")?
        .context("Server error")?;
    info!("Summarizer stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}
