use anyhow::Result;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::TurnConfig;
use crate::storage::AudioStore;
use crate::transport::{subjects, AudioChunkMessage, Command, ControlMessage, Transport};

use super::services::{ResponseGenerator, SpeechSynthesizer, Transcriber};
use super::turn::{run_session, TurnAudio};

/// Book-keeping for one live session
pub(super) struct SessionHandle {
    pub(super) device_id: String,
    pub(super) audio_tx: mpsc::Sender<TurnAudio>,
    /// Next expected chunk sequence; anything else is rejected
    pub(super) next_sequence: u64,
    pub(super) worker: JoinHandle<()>,
}

/// The remote half of the system: accepts wake events, routes audio chunks
/// to per-session workers, and drives each conversation's turn pipeline.
pub struct Orchestrator {
    transport: Arc<Transport>,
    store: Arc<dyn AudioStore>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: TurnConfig,
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<Transport>,
        store: Arc<dyn AudioStore>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: TurnConfig,
    ) -> Self {
        Self {
            transport,
            store,
            transcriber,
            generator,
            synthesizer,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run both inbound listeners until one fails
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let control = Arc::clone(&self);
        let audio = Arc::clone(&self);
        tokio::select! {
            result = control.run_control_listener() => result,
            result = audio.run_audio_listener() => result,
        }
    }

    async fn run_control_listener(self: Arc<Self>) -> Result<()> {
        let mut subscriber = self
            .transport
            .subscribe(subjects::ORCHESTRATOR_CONTROL.to_string())
            .await?;

        info!("Listening for wake events");

        while let Some(message) = subscriber.next().await {
            let control: ControlMessage = match serde_json::from_slice(&message.payload) {
                Ok(control) => control,
                Err(e) => {
                    warn!("Discarding unparseable control message: {}", e);
                    continue;
                }
            };

            match control.command {
                Command::WakeEvent {
                    device_id,
                    conversation_id,
                } => {
                    self.handle_wake(device_id, conversation_id).await;
                }
                Command::AgentShutdown => {
                    // An edge reporting a fatal local fault; its sessions
                    // will end through their own timeouts.
                    warn!("Edge device reported shutdown");
                }
                other => {
                    debug!("Ignoring control command addressed elsewhere: {:?}", other);
                }
            }
        }

        Ok(())
    }

    async fn handle_wake(&self, device_id: String, conversation_id: String) {
        let mut sessions = self.sessions.lock().await;

        // At-least-once delivery: a redelivered wake event for a live
        // session is a no-op.
        if sessions.contains_key(&conversation_id) {
            debug!("Duplicate wake event for {}; ignoring", conversation_id);
            return;
        }

        // A new wake from a device with a live session supersedes it; at
        // most one active conversation per edge device.
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| handle.device_id == device_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            warn!("New wake from {} supersedes session {}", device_id, id);
            if let Some(old) = sessions.remove(&id) {
                old.worker.abort();
            }
        }

        info!(
            "Wake event from {}; starting conversation {}",
            device_id, conversation_id
        );

        let (audio_tx, audio_rx) = mpsc::channel(100);
        let worker = tokio::spawn(run_session(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            Arc::clone(&self.transcriber),
            Arc::clone(&self.generator),
            Arc::clone(&self.synthesizer),
            self.config.clone(),
            device_id.clone(),
            conversation_id.clone(),
            audio_rx,
            Arc::clone(&self.sessions),
        ));

        sessions.insert(
            conversation_id,
            SessionHandle {
                device_id,
                audio_tx,
                next_sequence: 0,
                worker,
            },
        );
    }

    async fn run_audio_listener(self: Arc<Self>) -> Result<()> {
        let mut subscriber = self
            .transport
            .subscribe(subjects::AUDIO_WILDCARD.to_string())
            .await?;

        info!("Listening for audio chunks");

        while let Some(message) = subscriber.next().await {
            let chunk: AudioChunkMessage = match serde_json::from_slice(&message.payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Discarding unparseable audio chunk: {}", e);
                    continue;
                }
            };
            self.dispatch_chunk(chunk).await;
        }

        Ok(())
    }

    /// Route one chunk to its session, enforcing capture order. Duplicates
    /// and out-of-order arrivals are rejected and logged, never reordered.
    async fn dispatch_chunk(&self, chunk: AudioChunkMessage) {
        let audio_tx = {
            let mut sessions = self.sessions.lock().await;
            let Some(handle) = sessions.get_mut(&chunk.conversation_id) else {
                warn!(
                    "Discarding audio chunk for unknown conversation {}",
                    chunk.conversation_id
                );
                return;
            };
            if !sequence_in_order(handle.next_sequence, chunk.sequence) {
                warn!(
                    "Discarding chunk {} for {} (expected {})",
                    chunk.sequence, chunk.conversation_id, handle.next_sequence
                );
                return;
            }
            handle.next_sequence = chunk.sequence + 1;
            handle.audio_tx.clone()
        };

        let item = if chunk.final_chunk {
            TurnAudio::End {
                speech_detected: chunk.speech_detected,
            }
        } else {
            match self.store.fetch(&chunk.data).await {
                Ok(bytes) => TurnAudio::Chunk(bytes),
                Err(e) => {
                    error!(
                        "Failed to resolve audio chunk {} for {}: {:#}",
                        chunk.sequence, chunk.conversation_id, e
                    );
                    return;
                }
            }
        };

        if audio_tx.send(item).await.is_err() {
            debug!(
                "Session {} no longer accepting audio",
                chunk.conversation_id
            );
        }
    }

    /// Abort all session workers and tell their devices to stand down
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (id, handle) in sessions.drain() {
            handle.worker.abort();
            let message = ControlMessage::new(Command::AgentShutdown);
            if let Err(e) = self
                .transport
                .publish_control(&subjects::device_control(&handle.device_id), &message)
                .await
            {
                error!("Failed to send shutdown to {}: {:#}", handle.device_id, e);
            }
            info!("Aborted session {}", id);
        }
    }
}

/// Exactly the next expected sequence is accepted; duplicates (below) and
/// gaps (above) are both rejected.
fn sequence_in_order(expected: u64, incoming: u64) -> bool {
    incoming == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_next_sequence_is_accepted() {
        assert!(sequence_in_order(0, 0));
        assert!(sequence_in_order(5, 5));
        // duplicate
        assert!(!sequence_in_order(5, 4));
        // gap
        assert!(!sequence_in_order(5, 7));
    }
}
