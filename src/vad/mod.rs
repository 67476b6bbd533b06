//! Voice activity detection
//!
//! This module provides the two-phase, debounced activity detector that
//! decides frame by frame when the user has started speaking, when they have
//! stopped, and when to give up waiting. Raw RMS is noisy: a single loud
//! click must not start capture, and a single short pause must not end it.

mod detector;

pub use detector::{SpeechDetector, SpeechEvent, VadConfig, VadState};
