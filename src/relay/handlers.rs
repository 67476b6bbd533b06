use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::transport::{subjects, AudioChunkMessage, Command, ControlMessage};

use super::state::RelayState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WakeEventRequest {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct WakeEventResponse {
    pub status: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct IngressResponse {
    pub status: String,
    pub conversation_id: String,
    pub sequence: u64,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /stream/audio/ingress
/// Store one raw audio batch and publish its chunk notification
pub async fn audio_ingress(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(conversation_id) = header_string(&headers, "x-conversation-id") else {
        return bad_request("missing x-conversation-id header");
    };
    let Some(sequence) = header_string(&headers, "x-sequence").and_then(|v| v.parse().ok()) else {
        return bad_request("missing or invalid x-sequence header");
    };
    if body.is_empty() {
        return bad_request("empty audio body");
    }

    let sample_rate = header_string(&headers, "x-sample-rate")
        .and_then(|v| v.parse().ok())
        .unwrap_or(16000);
    let channels = header_string(&headers, "x-channels")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let data = match state.store.put(&conversation_id, &body).await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to store ingress audio: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to store audio chunk".to_string(),
                }),
            )
                .into_response();
        }
    };

    let message = AudioChunkMessage {
        conversation_id: conversation_id.clone(),
        sequence,
        data,
        sample_rate,
        channels,
        timestamp: chrono::Utc::now(),
        final_chunk: false,
        speech_detected: true,
    };

    if let Err(e) = state.transport.publish_chunk(&message).await {
        error!("Failed to publish chunk notification: {:#}", e);
        return (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: "stored audio but failed to publish notification".to_string(),
            }),
        )
            .into_response();
    }

    info!(
        "Relayed audio chunk {} for {} ({} bytes)",
        sequence,
        conversation_id,
        body.len()
    );

    (
        StatusCode::OK,
        Json(IngressResponse {
            status: "chunk stored and notification sent".to_string(),
            conversation_id,
            sequence,
            size: body.len(),
        }),
    )
        .into_response()
}

/// POST /event/wake-word-detected
/// Publish a wake event on behalf of an HTTP-only edge
pub async fn wake_event(
    State(state): State<RelayState>,
    Json(request): Json<WakeEventRequest>,
) -> impl IntoResponse {
    let conversation_id = uuid::Uuid::new_v4().to_string();

    info!(
        "Wake event from {}; proposing conversation {}",
        request.device_id, conversation_id
    );

    let message = ControlMessage::new(Command::WakeEvent {
        device_id: request.device_id,
        conversation_id: conversation_id.clone(),
    });

    match state
        .transport
        .publish_control(subjects::ORCHESTRATOR_CONTROL, &message)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(WakeEventResponse {
                status: "wake_event_published".to_string(),
                conversation_id,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to publish wake event: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "transport unavailable for wake events".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
