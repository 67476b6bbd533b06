//! HTTP audio-ingress relay
//!
//! Fronts the orchestrator for edges that speak HTTP instead of NATS:
//! - POST /stream/audio/ingress - store one audio batch, publish its notification
//! - POST /event/wake-word-detected - publish a wake event
//! - GET /health - health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::RelayState;
