//! pdk-server entry point.
//!
//! This file is intentionally thin: it loads configuration, sets up tracing,
//! connects and migrates the ledger, builds the shared state, wires
//! middleware, and starts the HTTP server. All route handlers live in
//! `routes/`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::Method;
use pdk_config::Config;
use pdk_server::{routes, state::AppState};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience: silent if the file does not exist; production
    // injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = Config::from_env().context("configuration error")?;
    info!(
        fingerprint = %config.fingerprint(),
        mode = config.run_mode.as_str(),
        "configuration loaded"
    );

    let pool = pdk_ledger::connect(&config.database_url).await?;
    pdk_ledger::migrate(&pool).await?;

    let shared = Arc::new(AppState::new(&config, pool));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("pdk-server listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Drain live-engine runners with a bounded deadline before exit.
    shared.engine.shutdown(Duration::from_secs(10)).await;
    info!("shutdown complete");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Bearer tokens carry authorization; CORS can stay open.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl_c handler installation failed");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation failed")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
