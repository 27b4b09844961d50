use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),

    #[error("in-flight requests did not complete within {0:?} of shutdown")]
    ShutdownTimeout(Duration),
}

pub async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves `app` until `shutdown` resolves, then stops accepting connections
/// and waits up to `deadline` for in-flight requests. Running past the
/// deadline abandons them and returns `ShutdownTimeout`.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    deadline: Duration,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let signalled = Arc::new(Notify::new());

    let notify = signalled.clone();
    let graceful = async move {
        shutdown.await;
        info!(?deadline, "shutting down server");
        notify.notify_one();
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .into_future();
    tokio::pin!(server);

    info!(%addr, "starting server");

    let expired = async {
        signalled.notified().await;
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        result = &mut server => {
            result?;
            info!(%addr, "stopped server");
            Ok(())
        }
        _ = expired => Err(ServerError::ShutdownTimeout(deadline)),
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
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
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "caught signal"),
        _ = terminate => info!(signal = "SIGTERM", "caught signal"),
    }
}
