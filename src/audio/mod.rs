//! Audio capture primitives
//!
//! Frames, the pre-roll ring, the outbound turn batcher, the utterance WAV
//! dump, and the traits behind which the platform microphone, wake-word
//! model, and speaker playback live.

mod batcher;
mod devices;
mod frame;
mod preroll;
mod wav;

pub use batcher::TurnBatcher;
pub use devices::{AudioInput, ReplyPlayer, WakeWordDetector};
pub use frame::{rms, AudioFrame};
pub use preroll::PreRollRing;
pub use wav::UtteranceWriter;
