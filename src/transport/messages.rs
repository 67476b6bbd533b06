use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed command set exchanged between edge and orchestrator.
///
/// Adjacent tagging keeps the wire shape
/// `{"command": "...", "payload": {...}}`. A message whose command is outside
/// this set fails to parse; receivers log and discard it rather than falling
/// through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum Command {
    /// Edge → orchestrator: wake phrase detected, capture already starting
    /// under the proposed conversation id
    #[serde(rename = "WAKE_EVENT")]
    WakeEvent {
        device_id: String,
        conversation_id: String,
    },

    /// Orchestrator → edge: capture (or keep capturing) an utterance under
    /// the given conversation id
    #[serde(rename = "START_LISTENING_SPEECH")]
    StartListeningSpeech { conversation_id: String },

    /// Orchestrator → edge: conversation over, fall back to wake-word
    /// listening and clear the conversation id
    #[serde(rename = "START_LISTENING_WAKE_WORD")]
    StartListeningWakeWord { conversation_id: Option<String> },

    /// Either direction: abandon everything in progress
    #[serde(rename = "AGENT_SHUTDOWN")]
    AgentShutdown,

    /// Orchestrator → edge: a synthesized reply is ready to fetch and play
    #[serde(rename = "REPLY_READY")]
    ReplyReady {
        conversation_id: String,
        data: DataReference,
        /// Text that was synthesized, for logging
        text: Option<String>,
        playback_duration_secs: Option<f64>,
    },
}

/// Envelope for one control command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub command: Command,
}

impl ControlMessage {
    pub fn new(command: Command) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            command,
        }
    }

    /// Conversation id carried by the payload, if the command has one
    pub fn conversation_id(&self) -> Option<&str> {
        match &self.command {
            Command::WakeEvent {
                conversation_id, ..
            } => Some(conversation_id),
            Command::StartListeningSpeech { conversation_id } => Some(conversation_id),
            Command::StartListeningWakeWord { conversation_id } => conversation_id.as_deref(),
            Command::AgentShutdown => None,
            Command::ReplyReady {
                conversation_id, ..
            } => Some(conversation_id),
        }
    }
}

/// Where a chunk's audio bytes live: inline in the message, or behind a
/// storage reference the receiver resolves before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataReference {
    /// Base64-encoded bytes carried in the message itself
    Inline { data: String },
    /// Key into the audio store
    Blob { reference: String },
}

/// One batched audio chunk published by the edge (or the ingress relay)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkMessage {
    pub conversation_id: String,
    /// Capture-order position; receivers reject duplicates and reordering
    pub sequence: u64,
    pub data: DataReference,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: DateTime<Utc>,
    /// Marks the last chunk of a capture attempt
    #[serde(rename = "final")]
    pub final_chunk: bool,
    /// False on a final marker when the attempt produced no usable speech
    pub speech_detected: bool,
}
