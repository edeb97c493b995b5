//! Route handlers

use super::AppState;
use crate::commands::StartCommand;
use crate::gateway::{GuildId, MembershipUpdate, UserId};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

/// Static liveness body for uptime checks
pub async fn liveness() -> &'static str {
    "Bot is running!"
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Presence
// ============================================================================

/// Queue a membership update for the watcher
pub async fn ingest_presence(
    State(state): State<AppState>,
    Json(update): Json<MembershipUpdate>,
) -> impl IntoResponse {
    match state.presence_tx.send(update).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "queued": true })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "presence watcher is not running" })),
        ),
    }
}

// ============================================================================
// Commands
// ============================================================================

pub async fn start_command(
    State(state): State<AppState>,
    Json(cmd): Json<StartCommand>,
) -> impl IntoResponse {
    Json(state.commands.start(cmd).await)
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    pub guild_id: GuildId,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

pub async fn end_command(
    State(state): State<AppState>,
    Json(req): Json<EndRequest>,
) -> impl IntoResponse {
    if let Some(user_id) = req.user_id {
        tracing::debug!("end requested by user {}", user_id);
    }
    Json(state.commands.end(req.guild_id).await)
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub guild_id: GuildId,
    pub limit: Option<usize>,
}

pub async fn records_command(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> impl IntoResponse {
    Json(state.commands.records(query.guild_id, query.limit).await)
}

// ============================================================================
// Scopes
// ============================================================================

pub async fn list_scopes(State(state): State<AppState>) -> impl IntoResponse {
    let scopes: Vec<_> = state
        .managers
        .iter()
        .map(|m| {
            serde_json::json!({
                "scope": m.scope(),
                "current": m.current(),
            })
        })
        .collect();
    Json(scopes)
}
