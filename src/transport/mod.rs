//! Control and audio messaging between edge and orchestrator
//!
//! Small JSON control commands flow over per-device and orchestrator
//! subjects; batched audio chunks flow over per-conversation subjects.
//! Delivery is at-least-once, so every receiver treats duplicate commands as
//! no-ops and verifies conversation ids before acting.

mod client;
pub mod messages;
pub mod subjects;

pub use client::Transport;
pub use messages::{AudioChunkMessage, Command, ControlMessage, DataReference};
