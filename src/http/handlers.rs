use super::state::AppState;
use crate::messages::{InboundMessage, OutboundMessage};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!("{}: {:#}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
        .into_response()
}

fn accepted(status: &str, message: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            status: status.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /message
/// Dispatch a raw channel message; queries answer with their response message
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Response {
    match state.controller.handle_message(message).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error("Failed to handle message", e),
    }
}

/// POST /record/start
/// Start a new recording session, superseding any active one
pub async fn start_recording(State(state): State<AppState>) -> Response {
    info!("Start requested over HTTP");
    match state.controller.start().await {
        Ok(()) => accepted("starting", "Recording start requested"),
        Err(e) => internal_error("Failed to start recording", e),
    }
}

/// POST /record/stop
/// Stop the active session without restarting it
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    info!("Stop requested over HTTP");
    match state.controller.stop().await {
        Ok(()) => accepted("stopping", "Recording stop requested"),
        Err(e) => internal_error("Failed to stop recording", e),
    }
}

/// GET /record/running
pub async fn get_running(State(state): State<AppState>) -> Response {
    match state.controller.is_running().await {
        Ok(running) => (StatusCode::OK, Json(OutboundMessage::Running(running))).into_response(),
        Err(e) => internal_error("Failed to query state", e),
    }
}

/// GET /record/status
/// Stats of the active session
pub async fn get_status(State(state): State<AppState>) -> Response {
    match state.controller.stats().await {
        Ok(Some(stats)) => (StatusCode::OK, Json(stats)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No active recording".to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_error("Failed to get stats", e),
    }
}

/// GET /codecs
pub async fn get_codecs(State(state): State<AppState>) -> Response {
    match state.controller.available_codecs().await {
        Ok(codecs) => (StatusCode::OK, Json(OutboundMessage::AvailableCodecs(codecs))).into_response(),
        Err(e) => internal_error("Failed to list codecs", e),
    }
}

/// PUT /settings
/// Merge settings for the next session
pub async fn update_settings(
    State(state): State<AppState>,
    Json(partial): Json<Map<String, Value>>,
) -> Response {
    match state.controller.update_settings(partial).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error("Failed to update settings", e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
