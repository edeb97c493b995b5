//! HTTP API module for Voxlog
//!
//! Serves the liveness endpoint, command and presence ingress for the relay,
//! and a Server-Sent Events stream of session events.

mod auth;
pub mod routes;
mod sse;

use crate::commands::CommandHandler;
use crate::error::{CoreError, Result};
use crate::events::SessionEvent;
use crate::gateway::MembershipUpdate;
use crate::session::SessionManager;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub api_key: Option<String>,
    pub commands: Arc<CommandHandler>,
    /// Scope managers, for status reporting
    pub managers: Arc<Vec<SessionManager>>,
    /// Feeds the presence watcher
    pub presence_tx: mpsc::Sender<MembershipUpdate>,
    /// Broadcast channel for SSE events
    pub event_tx: broadcast::Sender<SessionEvent>,
}

/// Start the HTTP API server
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::Api(e.to_string()))?;

    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/presence", post(routes::ingest_presence))
        .route("/commands/start", post(routes::start_command))
        .route("/commands/end", post(routes::end_command))
        .route("/commands/records", get(routes::records_command))
        .route("/scopes", get(routes::list_scopes))
        .route("/events", get(sse::events_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        // Liveness (public, no auth required)
        .route("/", get(routes::liveness))
        .route("/health", get(routes::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
