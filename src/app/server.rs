use axum::Router;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ScribeError;

/// Bind `host:port` and serve until SIGINT/SIGTERM or until
/// `shutdown_token` is cancelled elsewhere.
pub async fn serve(
    app: Router,
    settings: &Settings,
    shutdown_token: CancellationToken,
) -> Result<(), ScribeError> {
    let address = settings.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ScribeError::Bind {
            address: address.clone(),
            source: e,
        })?;
    info!("Server listening on {}", listener.local_addr()?);

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => signal_token.cancel(),
            () = signal_token.cancelled() => {}
        }
    });

    serve_with_listener(listener, app, shutdown_token, settings.shutdown_timeout()).await
}

/// Serve on an already bound listener. Once `shutdown_token` is cancelled
/// no new connections are accepted and in-flight requests get
/// `shutdown_timeout` to finish before they are abandoned.
pub async fn serve_with_listener(
    listener: TcpListener,
    app: Router,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
) -> Result<(), ScribeError> {
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        () = shutdown_token.cancelled() => {
            match tokio::time::timeout(shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(
                    timeout = ?shutdown_timeout,
                    "in-flight requests did not finish in time, abandoning them"
                ),
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
