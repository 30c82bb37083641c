use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod auth;
mod config;
mod editor;
mod error;

use crate::api::AppState;
use crate::config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting PDF stamp service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ServiceConfig::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        fetch_timeout_secs = config.fetch.timeout_secs,
        max_body_bytes = config.limits.max_body_bytes,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(&config)?);
    let app = api::router(state, &config);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_stamp_service=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
