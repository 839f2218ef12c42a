//! relay-server: process entry point. Load configuration, build the
//! process-wide state, bind the listener, serve with graceful shutdown.

use relay_core::RelaySettings;
use relay_server::{create_router, AppState};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Waits for Ctrl+C or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("relay_server=debug".parse().unwrap())
                .add_directive("relay_pipeline=debug".parse().unwrap()),
        )
        .init();

    let settings = RelaySettings::from_env();
    let shutdown_grace = settings.shutdown_grace();
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;

    let state = AppState::from_settings(settings)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "starting relay-server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining in-flight dispatches");
        })
        .await?;

    // In-flight dispatch tasks are detached `tokio::spawn`s rather than
    // handles tracked in a `JoinSet`; this sleep is the bounded grace
    // period that gives them a chance to reach a terminal repository
    // status before the process exits. A dispatch that doesn't finish in
    // time leaves its event stuck in `processing`.
    tokio::time::sleep(shutdown_grace).await;
    info!("relay-server stopped cleanly");
    Ok(())
}
