//! NATS subject scheme

/// Control commands addressed to one edge device
pub fn device_control(device_id: &str) -> String {
    format!("voice.control.device.{}", device_id)
}

/// Wake events and edge-originated notices addressed to the orchestrator
pub const ORCHESTRATOR_CONTROL: &str = "voice.control.orchestrator";

/// Audio chunks for one conversation
pub fn conversation_audio(conversation_id: &str) -> String {
    format!("voice.audio.{}", conversation_id)
}

/// Wildcard over all conversations' audio
pub const AUDIO_WILDCARD: &str = "voice.audio.>";
