use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Raw message channel
        .route("/message", post(handlers::post_message))
        // Recording control
        .route("/record/start", post(handlers::start_recording))
        .route("/record/stop", post(handlers::stop_recording))
        .route("/record/running", get(handlers::get_running))
        .route("/record/status", get(handlers::get_status))
        // Codecs and settings
        .route("/codecs", get(handlers::get_codecs))
        .route("/settings", put(handlers::update_settings))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
