//! Coordinator server using Axum.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::core::Registry;
use crate::error::Result;
use crate::protocol::Rendezvous;

use super::router::create_app_router;

/// Run the coordinator until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let listener = TcpListener::bind(config.addr()).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    serve(listener, config).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let registry = Registry::new(config.liveness_interval());
    let rendezvous = Rendezvous::new(registry.clone(), config.poll_timeout());
    let app = create_app_router(rendezvous, &config);

    tracing::info!(
        poll_timeout = ?config.poll_timeout(),
        liveness_interval = ?config.liveness_interval(),
        "Coordinator ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    tracing::info!("Coordinator stopped");
    Ok(())
}

/// Resolve on Ctrl-C, draining the registry so no new polls find a record.
async fn shutdown_signal(registry: Arc<Registry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown requested, waiting for in-flight polls");
    registry.drain();
}
