use anyhow::Result;
use base64::Engine;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::audio::ReplyPlayer;
use crate::storage::AudioStore;
use crate::transport::{subjects, AudioChunkMessage, Command, ControlMessage, DataReference, Transport};

use super::capture::Outbound;
use super::state::SharedDeviceState;

/// Drain the capture thread's outbound channel and publish over NATS.
///
/// Chunk sequence numbers restart at every wake event and then run
/// continuously across the turns of one conversation.
pub async fn run_outbound_publisher(
    transport: Arc<Transport>,
    device_id: String,
    sample_rate: u32,
    channels: u16,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut chunk_sequence: u64 = 0;

    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Wake { conversation_id } => {
                chunk_sequence = 0;
                let message = ControlMessage::new(Command::WakeEvent {
                    device_id: device_id.clone(),
                    conversation_id,
                });
                if let Err(e) = transport
                    .publish_control(subjects::ORCHESTRATOR_CONTROL, &message)
                    .await
                {
                    error!("Failed to publish wake event: {:#}", e);
                }
            }
            Outbound::Batch {
                conversation_id,
                frames,
            } => {
                let pcm: Vec<u8> = frames.iter().flat_map(|f| f.to_le_bytes()).collect();
                let message = AudioChunkMessage {
                    conversation_id,
                    sequence: chunk_sequence,
                    data: DataReference::Inline {
                        data: base64::engine::general_purpose::STANDARD.encode(&pcm),
                    },
                    sample_rate,
                    channels,
                    timestamp: chrono::Utc::now(),
                    final_chunk: false,
                    speech_detected: true,
                };
                match transport.publish_chunk(&message).await {
                    Ok(()) => chunk_sequence += 1,
                    Err(e) => {
                        // The orchestrator rejects gaps, so a lost batch ends
                        // the turn's usable audio; keep the sequence honest.
                        error!("Failed to publish audio batch: {:#}", e);
                        chunk_sequence += 1;
                    }
                }
            }
            Outbound::TurnEnd {
                conversation_id,
                speech_detected,
            } => {
                let message = AudioChunkMessage {
                    conversation_id,
                    sequence: chunk_sequence,
                    data: DataReference::Inline {
                        data: String::new(),
                    },
                    sample_rate,
                    channels,
                    timestamp: chrono::Utc::now(),
                    final_chunk: true,
                    speech_detected,
                };
                if let Err(e) = transport.publish_chunk(&message).await {
                    error!("Failed to publish end-of-turn marker: {:#}", e);
                }
                chunk_sequence += 1;
            }
        }
    }
}

/// Receive control commands and reply notifications addressed to this
/// device. State transitions happen under the shared mutex; reply playback
/// happens under the playback lock so replies never overlap.
pub async fn run_control_listener(
    shared: Arc<SharedDeviceState>,
    transport: Arc<Transport>,
    store: Arc<dyn AudioStore>,
    player: Arc<Mutex<Box<dyn ReplyPlayer>>>,
    device_id: String,
) -> Result<()> {
    let mut subscriber = transport
        .subscribe(subjects::device_control(&device_id))
        .await?;

    info!("Listening for orchestrator commands");

    while let Some(message) = subscriber.next().await {
        let control: ControlMessage = match serde_json::from_slice(&message.payload) {
            Ok(control) => control,
            Err(e) => {
                warn!("Discarding unparseable control message: {}", e);
                continue;
            }
        };

        match &control.command {
            Command::ReplyReady {
                conversation_id,
                data,
                text,
                ..
            } => {
                handle_reply(&shared, &store, &player, conversation_id, data, text.as_deref())
                    .await;
            }
            other => shared.apply_command(other, Instant::now()),
        }

        if shared.is_shutdown() {
            break;
        }
    }

    Ok(())
}

async fn handle_reply(
    shared: &Arc<SharedDeviceState>,
    store: &Arc<dyn AudioStore>,
    player: &Arc<Mutex<Box<dyn ReplyPlayer>>>,
    conversation_id: &str,
    data: &DataReference,
    text: Option<&str>,
) {
    // A reply tagged with a stale or unknown conversation id is discarded,
    // never played.
    match shared.conversation_id() {
        Some(current) if current == conversation_id => {}
        current => {
            warn!(
                "Discarding reply for conversation {} (current: {:?})",
                conversation_id, current
            );
            return;
        }
    }

    let audio = match store.fetch(data).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to fetch reply audio: {:#}", e);
            return;
        }
    };

    if let Some(text) = text {
        info!("Playing reply ({} bytes): {:?}", audio.len(), text);
    } else {
        info!("Playing reply ({} bytes)", audio.len());
    }

    let player = Arc::clone(player);
    let played = tokio::task::spawn_blocking(move || {
        let mut guard = player.lock().expect("playback lock poisoned");
        guard.play(&audio)
    })
    .await;

    match played {
        Ok(Ok(())) => {
            if shared.begin_user_turn(Instant::now()) {
                info!("Reply played; awaiting the user's next turn");
            }
        }
        Ok(Err(e)) => error!("Reply playback failed: {:#}", e),
        Err(e) => error!("Playback task panicked: {}", e),
    }
}
