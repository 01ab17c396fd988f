mod router;
pub mod server;
mod state;
pub mod tracing;

pub use router::build_router;
pub use state::AppState;

use crate::config;
use crate::error::ScribeError;
use tokio_util::sync::CancellationToken;

/// Application entry point. Initializes tracing and configuration, serves
/// until shutdown, then checkpoints the store.
pub async fn run() -> Result<(), ScribeError> {
    // `scribe healthcheck` checks a running instance and exits
    if std::env::args().nth(1).as_deref() == Some("healthcheck") {
        match crate::healthcheck().await {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1)
            }
        }
    }

    tracing::init_tracing()?;

    let settings = config::get_configuration()?;
    ::tracing::info!(
        db_path = %settings.db_path.display(),
        rate_limit = settings.rate_limit,
        retention_days = settings.retention_days,
        "Loaded settings"
    );

    // Shared shutdown token: server, event hub, refill loop, retention worker
    let shutdown_token = CancellationToken::new();
    let state = AppState::from_settings(&settings, shutdown_token.clone()).await?;
    let app = build_router(state.clone());

    let served = server::serve(app, &settings, shutdown_token.clone()).await;

    shutdown_token.cancel();
    state.join_background().await;
    state.store.close().await?;
    ::tracing::info!("Store closed");
    served
}
