use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::RelayState;

/// Create the HTTP router with all routes
pub fn create_router(state: RelayState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Audio ingress
        .route("/stream/audio/ingress", post(handlers::audio_ingress))
        // Wake events
        .route("/event/wake-word-detected", post(handlers::wake_event))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
