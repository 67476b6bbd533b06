//! Remote session orchestrator
//!
//! Owns per-conversation state and drives the transcribe → respond →
//! synthesize pipeline. One listener task per inbound source (wake events,
//! audio chunks); per-session work runs on its own task so a slow turn on
//! one session never blocks accepting new wake events.

mod orchestrator;
mod services;
mod session;
mod turn;

pub use orchestrator::Orchestrator;
pub use services::{
    ResponseGenerator, SpeechSynthesizer, SynthesizedReply, Transcriber, TranscriptResult,
    TranscriptionStream,
};
pub use session::{ConversationSession, SessionState};
