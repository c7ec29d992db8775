//! ORBIT Gateway - a thin chat proxy in front of Gemini.
//!
//! Keeps a short rolling history per client session and forwards each
//! message, with that history and a fixed persona preamble, to the model.
//!
//! ## Architecture
//!
//! ```text
//! Client → POST /api/chat → ChatService ─(session lock)→ SessionStore
//!                               ↓
//!                           Provider (Gemini)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod provider;
pub mod routes;
pub mod session;

pub use chat::{ChatOutcome, ChatService, GenerationSettings};
pub use provider::{ChatRequest, ChatResponse, GeminiProvider, Provider, ProviderError};
pub use routes::AppState;
pub use session::{History, Role, SessionStore, Turn};

use axum::Router;
use orbit_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the application state from configuration.
///
/// The session store is created here and lives as long as the returned state.
pub fn build_state(config: &Config) -> AppState {
    let store = Arc::new(SessionStore::with_max_turns(config.session.max_turns));
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::from_config(&config.model));

    AppState::new(ChatService::new(
        store,
        provider,
        GenerationSettings::from(&config.model),
    ))
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState, cors_allow_any: bool) -> Router {
    let router = routes::build_routes(state);

    if cors_allow_any {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let host = config
        .server
        .host
        .parse::<std::net::IpAddr>()
        .map_err(|e| {
            orbit_common::Error::Config(format!("invalid server.host {:?}: {e}", config.server.host))
        })?;
    let addr = SocketAddr::from((host, config.server.port));

    if !config.has_api_key() {
        tracing::warn!("No Gemini API key configured; chat requests will fail until GEMINI_API_KEY is set");
    }

    let router = build_router(build_state(config), config.server.cors_allow_any);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ORBIT gateway running on http://{}", addr);
    tracing::info!(model = %config.model.name, "Ready to receive requests");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("ORBIT gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
