//! HTTP request handlers

use crate::api::server::AppContext;
use crate::controller::CommandOutcome;
use crate::error::Result;
use crate::playback::PlaybackSnapshot;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use onair_common::events::RadioEvent;
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    uptime_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EffectsResponse {
    effects: Vec<String>,
}

// ============================================================================
// Pages
// ============================================================================

/// GET / - redirect to the listener page
pub async fn root_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/home")]).into_response()
}

// ============================================================================
// Control
// ============================================================================

/// POST /controller - run an operator command (`start`, `stop` or an effect name)
pub async fn handle_command(
    State(ctx): State<AppContext>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>> {
    let outcome = ctx.controller.handle_command(&request.command).await?;

    let (session, effect) = match outcome {
        CommandOutcome::Started { session } => (Some(session), None),
        CommandOutcome::Stopped { .. } => (None, None),
        CommandOutcome::EffectQueued { effect, .. } => (
            None,
            effect
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        ),
    };

    Ok(Json(CommandResponse {
        result: "ok".to_string(),
        session,
        effect,
    }))
}

/// GET /effects - names of the available sound effects
pub async fn list_effects(State(ctx): State<AppContext>) -> Result<Json<EffectsResponse>> {
    let effects = ctx.controller.effects().list().await?;
    Ok(Json(EffectsResponse { effects }))
}

// ============================================================================
// Listener stream
// ============================================================================

/// GET /stream - join the broadcast
///
/// The response body stays open for as long as the client reads it; when
/// the client goes away the body, and with it the listener, is dropped.
pub async fn stream(State(ctx): State<AppContext>) -> Response {
    let registry = ctx.controller.orchestrator().registry();
    let (listener_id, listener) = registry.connect();
    let listeners = registry.listener_count();

    info!("Streaming to listener {}", listener_id);
    ctx.state.broadcast_event(RadioEvent::ListenerConnected {
        listener_id,
        listeners,
        timestamp: chrono::Utc::now(),
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::ACCEPT_RANGES, "bytes"),
        ],
        Body::from_stream(listener),
    )
        .into_response()
}

// ============================================================================
// Status
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "onair-bc".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: ctx.state.uptime_seconds(),
    })
}

/// GET /status - playback snapshot
pub async fn status(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    Json(ctx.controller.orchestrator().snapshot().await)
}
