use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::TurnConfig;
use crate::storage::AudioStore;
use crate::transport::{subjects, Command, ControlMessage, Transport};

use super::orchestrator::SessionHandle;
use super::services::{ResponseGenerator, SpeechSynthesizer, Transcriber};
use super::session::{ConversationSession, SessionState};

/// Spoken when response generation fails; dead air is worse than an apology.
const FALLBACK_REPLY: &str = "I had a little trouble thinking of a response.";

/// Resolved audio traffic routed to one session's worker
#[derive(Debug)]
pub(super) enum TurnAudio {
    Chunk(Vec<u8>),
    End { speech_detected: bool },
}

/// Outcome of one transcription turn
#[derive(Debug, PartialEq)]
enum TurnOutcome {
    Transcript(String),
    NoSpeech,
    Timeout,
}

/// Drive one conversation from its first turn to its end, then send the edge
/// back to wake-word listening and deregister the session.
#[allow(clippy::too_many_arguments)]
pub(super) async fn run_session(
    transport: Arc<Transport>,
    store: Arc<dyn AudioStore>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: TurnConfig,
    device_id: String,
    conversation_id: String,
    mut audio_rx: mpsc::Receiver<TurnAudio>,
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
) {
    let mut session = ConversationSession::new(conversation_id);
    info!("Session {} started for device {}", session.id, device_id);

    // Confirm the conversation id back to the edge. The edge is already
    // capturing under it; the command makes the id authoritative and is a
    // no-op if redelivered.
    send_command(
        &transport,
        &subjects::device_control(&device_id),
        Command::StartListeningSpeech {
            conversation_id: session.id.clone(),
        },
    )
    .await;

    loop {
        session.set_state(SessionState::Transcribing);
        let outcome = transcribe_turn(transcriber.as_ref(), &mut audio_rx, &config).await;

        match outcome {
            TurnOutcome::Transcript(text) => {
                info!("Transcript for {}: {:?}", session.id, text);
                if is_goodbye(&text, &config.goodbye_phrases) {
                    info!("Goodbye phrase detected; ending conversation {}", session.id);
                    session.set_state(SessionState::Ending);
                    break;
                }

                session.set_state(SessionState::Responding);
                let responded = tokio::time::timeout(
                    config.turn_timeout(),
                    respond(
                        &transport,
                        &store,
                        generator.as_ref(),
                        synthesizer.as_ref(),
                        &device_id,
                        &session.id,
                        &text,
                    ),
                )
                .await;

                match responded {
                    Ok(Ok(())) => {
                        // The edge moves itself to awaiting-user-turn once
                        // playback finishes; no command is sent here.
                        session.set_state(SessionState::Continuing);
                    }
                    Ok(Err(e)) => {
                        error!("Turn failed for {}: {:#}", session.id, e);
                        session.set_state(SessionState::Ending);
                        break;
                    }
                    Err(_) => {
                        error!("Response pipeline timed out for {}", session.id);
                        session.set_state(SessionState::Ending);
                        break;
                    }
                }
            }
            TurnOutcome::NoSpeech => {
                info!("No usable speech for {}; ending conversation", session.id);
                session.set_state(SessionState::Ending);
                break;
            }
            TurnOutcome::Timeout => {
                warn!("Turn timed out for {}; ending conversation", session.id);
                session.set_state(SessionState::Ending);
                break;
            }
        }
    }

    send_command(
        &transport,
        &subjects::device_control(&device_id),
        Command::StartListeningWakeWord {
            conversation_id: Some(session.id.clone()),
        },
    )
    .await;

    sessions.lock().await.remove(&session.id);
    info!("Session {} ended", session.id);
}

/// Run one transcription turn: forward inbound audio into the service and
/// wait for a final transcript, applying the empty-accept grace rule.
///
/// An empty final result arriving before
/// `min_turn_duration_before_empty_accept` means the service gave up before
/// the user had a fair chance to speak; the result is discarded and a fresh
/// stream is armed while the turn clock keeps running. The per-turn deadline
/// bounds the whole wait regardless.
async fn transcribe_turn(
    transcriber: &dyn Transcriber,
    audio_rx: &mut mpsc::Receiver<TurnAudio>,
    config: &TurnConfig,
) -> TurnOutcome {
    let turn_started = Instant::now();
    let deadline = tokio::time::Instant::from_std(turn_started + config.turn_timeout());

    let mut stream = match transcriber.start_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to start transcription stream: {:#}", e);
            return TurnOutcome::Timeout;
        }
    };
    let mut edge_done = false;

    loop {
        tokio::select! {
            inbound = audio_rx.recv(), if !edge_done => {
                match inbound {
                    Some(TurnAudio::Chunk(bytes)) => {
                        if stream.audio_tx.send(bytes).await.is_err() {
                            debug!("Transcription stream closed its audio input");
                        }
                    }
                    Some(TurnAudio::End { speech_detected: false }) => {
                        return TurnOutcome::NoSpeech;
                    }
                    Some(TurnAudio::End { speech_detected: true }) => {
                        // The edge stopped capturing; the final transcript
                        // may still be in flight.
                        edge_done = true;
                    }
                    None => {
                        edge_done = true;
                    }
                }
            }
            result = stream.results_rx.recv() => {
                match result {
                    Some(result) if result.is_final => {
                        let text = result.text.trim().to_string();
                        if text.is_empty()
                            && turn_started.elapsed() < config.min_turn_duration_before_empty_accept()
                        {
                            warn!(
                                "Empty transcript {:.1}s into turn; re-arming transcription",
                                turn_started.elapsed().as_secs_f64()
                            );
                            match transcriber.start_stream().await {
                                Ok(new_stream) => {
                                    stream = new_stream;
                                    continue;
                                }
                                Err(e) => {
                                    error!("Failed to re-arm transcription: {:#}", e);
                                    return TurnOutcome::Timeout;
                                }
                            }
                        }
                        if text.is_empty() {
                            return TurnOutcome::NoSpeech;
                        }
                        return TurnOutcome::Transcript(text);
                    }
                    Some(interim) => {
                        debug!("Interim transcript: {:?}", interim.text);
                    }
                    None => {
                        // Stream ended without a final result; treat it like
                        // an early empty transcript.
                        if turn_started.elapsed() < config.min_turn_duration_before_empty_accept() {
                            warn!("Transcription stream closed early; re-arming");
                            match transcriber.start_stream().await {
                                Ok(new_stream) => stream = new_stream,
                                Err(e) => {
                                    error!("Failed to re-arm transcription: {:#}", e);
                                    return TurnOutcome::Timeout;
                                }
                            }
                        } else {
                            return TurnOutcome::NoSpeech;
                        }
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return TurnOutcome::Timeout;
            }
        }
    }
}

/// Generate, synthesize, store, and announce one reply
async fn respond(
    transport: &Transport,
    store: &Arc<dyn AudioStore>,
    generator: &dyn ResponseGenerator,
    synthesizer: &dyn SpeechSynthesizer,
    device_id: &str,
    conversation_id: &str,
    transcript: &str,
) -> Result<()> {
    let reply_text = match generator.generate(transcript).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Response generation failed: {:#}", e);
            FALLBACK_REPLY.to_string()
        }
    };
    debug!("Reply for {}: {:?}", conversation_id, reply_text);

    let reply = synthesizer
        .synthesize(&reply_text)
        .await
        .context("Speech synthesis failed")?;

    let data = store
        .put(conversation_id, &reply.wav_bytes)
        .await
        .context("Failed to store reply audio")?;

    let message = ControlMessage::new(Command::ReplyReady {
        conversation_id: conversation_id.to_string(),
        data,
        text: Some(reply_text),
        playback_duration_secs: Some(reply.duration_secs),
    });
    transport
        .publish_control(&subjects::device_control(device_id), &message)
        .await
        .context("Failed to publish reply notification")?;

    Ok(())
}

fn is_goodbye(transcript: &str, phrases: &[String]) -> bool {
    let lowered = transcript.to_lowercase();
    phrases.iter().any(|phrase| lowered.contains(phrase.as_str()))
}

async fn send_command(transport: &Transport, subject: &str, command: Command) {
    let message = ControlMessage::new(command);
    if let Err(e) = transport.publish_control(subject, &message).await {
        error!("Failed to publish control command: {:#}", e);
    }
}
