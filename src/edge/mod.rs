//! Edge device: wake-word listening, VAD-gated capture, reply playback
//!
//! One dedicated thread owns the blocking microphone read and drives the
//! turn-taking state machine ([`CaptureLoop`]); async listener tasks receive
//! orchestrator commands and reply notifications, mutating shared state only
//! through [`SharedDeviceState`]'s guarded entry points.

mod capture;
mod listener;
mod state;

pub use capture::{CaptureLoop, Outbound};
pub use listener::{run_control_listener, run_outbound_publisher};
pub use state::{DeviceState, SharedDeviceState};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

use crate::audio::{AudioInput, ReplyPlayer, WakeWordDetector};
use crate::config::Config;
use crate::storage::AudioStore;
use crate::transport::{subjects, Command, ControlMessage, Transport};

/// Wire and run a complete edge device: the capture thread, the outbound
/// publisher, and the control/reply listener. Returns when the capture loop
/// stops — `Ok` on `AGENT_SHUTDOWN`, `Err` on an unrecoverable local fault
/// (after a best-effort shutdown notice to the orchestrator).
pub async fn run_edge(
    config: &Config,
    transport: Arc<Transport>,
    store: Arc<dyn AudioStore>,
    input: Box<dyn AudioInput>,
    wake: Box<dyn WakeWordDetector>,
    player: Box<dyn ReplyPlayer>,
) -> Result<()> {
    let shared = Arc::new(SharedDeviceState::new());
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let mut capture = CaptureLoop::new(config, Arc::clone(&shared), input, wake, outbound_tx);

    let publisher = tokio::spawn(run_outbound_publisher(
        Arc::clone(&transport),
        config.service.device_id.clone(),
        config.audio.sample_rate,
        config.audio.channels,
        outbound_rx,
    ));
    let listener = tokio::spawn(run_control_listener(
        Arc::clone(&shared),
        Arc::clone(&transport),
        store,
        Arc::new(std::sync::Mutex::new(player)),
        config.service.device_id.clone(),
    ));

    let result = tokio::task::spawn_blocking(move || capture.run()).await;

    listener.abort();
    publisher.abort();

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(fatal)) => {
            error!("Capture loop died: {}", fatal);
            let notice = ControlMessage::new(Command::AgentShutdown);
            if let Err(e) = transport
                .publish_control(subjects::ORCHESTRATOR_CONTROL, &notice)
                .await
            {
                error!("Failed to notify orchestrator of shutdown: {:#}", e);
            }
            Err(fatal.into())
        }
        Err(join_err) => Err(anyhow::anyhow!("capture thread panicked: {}", join_err)),
    }
}
