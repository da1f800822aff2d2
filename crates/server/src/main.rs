//! Tavern - a self-hosted chat service
//!
//! Serves the HTTP auth/history API and the realtime WebSocket relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod state;
mod ws;

use tavern_core::UserRepository;

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Tavern server");

    let config = config::ServerConfig::load();

    let state = match state::AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Failed to initialize server: {}", e);
            std::process::exit(1);
        }
    };

    // Background task for session cleanup
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let result = cleanup_state.db.lock().unwrap().cleanup_expired_sessions();
            match result {
                Ok(count) if count > 0 => {
                    tracing::info!(count, "Cleaned up expired sessions");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
            }
        }
    });

    let addr = SocketAddr::from((state.config.bind, state.config.port));
    let app = api::build_app(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, "Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %addr, "Listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
