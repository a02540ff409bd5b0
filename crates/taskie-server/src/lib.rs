//! taskie-server
//!
//! HTTP front end of the Taskie queue:
//!
//! - `PUT  /v1/push`       push a batch of tasks
//! - `GET  /v1/pop`        wait for a ready task and start executing it
//! - `POST /v1/complete`   finish a running task
//! - `GET  /v1/tasks/{id}` look up a held task
//! - `GET  /v1/counts`     queue counters

pub mod api;
pub mod config;
pub mod routes;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio::sync::watch;

use taskie_core::MemoryStore;

pub use config::{Config, LogFormat};
pub use routes::{Context, router};

/// Serve the API on `listener` until `shutdown` resolves.
///
/// Once `shutdown` fires the store is closed, so long-polling pops return
/// instead of holding the graceful shutdown open.
pub async fn serve<F>(listener: TcpListener, store: Context, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::clone(&store));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutting down");
            store.close().await;
        })
        .await
}

/// Run the server and its deadline monitor until a termination signal.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store: Context = Arc::new(MemoryStore::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.monitor(shutdown_rx).await }
    });

    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;
    tracing::info!(address = %listener.local_addr()?, "Taskie listening");

    serve(listener, store, shutdown_signal()).await?;

    // ignore send error: the monitor may already be gone
    let _ = shutdown_tx.send(true);
    monitor.await.context("task monitor panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
