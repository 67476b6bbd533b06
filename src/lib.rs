pub mod audio;
pub mod config;
pub mod edge;
pub mod error;
pub mod orchestrator;
pub mod relay;
pub mod storage;
pub mod transport;
pub mod vad;

pub use audio::{
    AudioFrame, AudioInput, PreRollRing, ReplyPlayer, TurnBatcher, UtteranceWriter,
    WakeWordDetector,
};
pub use config::Config;
pub use edge::{CaptureLoop, DeviceState, SharedDeviceState};
pub use error::FatalError;
pub use orchestrator::{ConversationSession, Orchestrator, SessionState};
pub use relay::{create_router, RelayState};
pub use storage::{AudioStore, FsAudioStore};
pub use transport::{AudioChunkMessage, Command, ControlMessage, DataReference, Transport};
pub use vad::{SpeechDetector, SpeechEvent, VadConfig, VadState};
