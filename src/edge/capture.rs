use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFrame, AudioInput, PreRollRing, TurnBatcher, UtteranceWriter, WakeWordDetector};
use crate::config::Config;
use crate::error::FatalError;
use crate::vad::{SpeechDetector, SpeechEvent};

use super::state::{DeviceState, SharedDeviceState};

/// Outbound traffic produced by the capture thread. Publishing happens on
/// the async side so this thread never blocks on the network.
#[derive(Debug)]
pub enum Outbound {
    /// Wake phrase detected; a new capture attempt is starting
    Wake { conversation_id: String },
    /// One batch of utterance frames, in capture order
    Batch {
        conversation_id: String,
        frames: Vec<AudioFrame>,
    },
    /// End of a capture attempt. `speech_detected` is false when the attempt
    /// produced no usable speech.
    TurnEnd {
        conversation_id: String,
        speech_detected: bool,
    },
}

/// The edge turn-taking state machine.
///
/// Owns the blocking microphone read and drives
/// `WakeIdle → CapturingSpeech → AwaitingOrchestrator → (AwaitingUserTurn)`
/// transitions. All shared-state mutation goes through [`SharedDeviceState`];
/// control-message handlers running on other threads steer this loop by
/// changing that state, which is re-read every frame.
pub struct CaptureLoop {
    shared: Arc<SharedDeviceState>,
    input: Box<dyn AudioInput>,
    wake: Box<dyn WakeWordDetector>,
    outbound: mpsc::UnboundedSender<Outbound>,
    detector: SpeechDetector,
    ring: PreRollRing,
    batcher: TurnBatcher,
    /// Mid-utterance silent frames held until we know whether the pause was
    /// a gap (shipped) or the end of the turn (dropped).
    pending_silence: Vec<AudioFrame>,
    utterance_writer: Option<UtteranceWriter>,
    silence_threshold_rms: f64,
    command_timeout: Duration,
    user_turn_timeout: Duration,
    wake_ack_delay: Duration,
    reopen_attempts: u32,
    reopen_backoff: Duration,
    sequence: u64,
}

impl CaptureLoop {
    pub fn new(
        config: &Config,
        shared: Arc<SharedDeviceState>,
        input: Box<dyn AudioInput>,
        wake: Box<dyn WakeWordDetector>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let utterance_writer = config.audio.utterance_dump_dir.as_ref().and_then(|dir| {
            match UtteranceWriter::new(dir, config.audio.sample_rate, config.audio.channels) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!("Utterance dumps disabled: {:#}", e);
                    None
                }
            }
        });

        Self {
            shared,
            input,
            wake,
            outbound,
            detector: SpeechDetector::new(config.vad.detector_config(), Instant::now()),
            ring: PreRollRing::new(config.capture.pre_roll_frames),
            batcher: TurnBatcher::new(config.capture.batch_frames),
            pending_silence: Vec::new(),
            utterance_writer,
            silence_threshold_rms: config.vad.silence_threshold_rms,
            command_timeout: config.capture.command_timeout(),
            user_turn_timeout: config.capture.user_turn_timeout(),
            wake_ack_delay: config.capture.wake_ack_delay(),
            reopen_attempts: config.capture.reopen_attempts,
            reopen_backoff: config.capture.reopen_backoff(),
            sequence: 0,
        }
    }

    /// Drive the state machine until shutdown. Returns `Ok` after an
    /// `AGENT_SHUTDOWN`, `Err` only for an unrecoverable local fault.
    pub fn run(&mut self) -> Result<(), FatalError> {
        info!("Capture loop started");
        while !self.shared.is_shutdown() {
            match self.shared.state() {
                DeviceState::WakeIdle => self.run_wake_idle()?,
                DeviceState::CapturingSpeech => self.run_capturing(),
                DeviceState::AwaitingOrchestrator => self.run_awaiting_orchestrator(),
                DeviceState::AwaitingUserTurn => self.run_awaiting_user_turn()?,
            }
        }
        info!("Capture loop stopped");
        Ok(())
    }

    /// Read one frame, transparently reopening a dead stream. Transient
    /// failures are retried with increasing backoff; exhaustion is reported
    /// to the caller, which decides whether that is fatal.
    fn read_frame_recovering(&mut self) -> Result<AudioFrame> {
        let mut attempt = 0u32;
        loop {
            match self.input.read_frame() {
                Ok(samples) => {
                    let frame = AudioFrame::new(samples, self.sequence);
                    self.sequence += 1;
                    return Ok(frame);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.reopen_attempts {
                        return Err(e.context(format!(
                            "audio input still failing after {} reopen attempts",
                            self.reopen_attempts
                        )));
                    }
                    warn!(
                        "Audio read failed ({}); reopening input (attempt {}/{})",
                        e, attempt, self.reopen_attempts
                    );
                    std::thread::sleep(self.reopen_backoff * attempt);
                    if let Err(reopen_err) = self.input.reopen() {
                        warn!("Input reopen failed: {}", reopen_err);
                    }
                }
            }
        }
    }

    fn run_wake_idle(&mut self) -> Result<(), FatalError> {
        debug!("Listening for wake word");
        while self.shared.state() == DeviceState::WakeIdle && !self.shared.is_shutdown() {
            let frame = match self.read_frame_recovering() {
                Ok(frame) => frame,
                Err(e) => {
                    // Idle with no working microphone: nothing to fall back to.
                    return Err(FatalError::AudioInputUnavailable {
                        attempts: self.reopen_attempts,
                        message: format!("{:#}", e),
                    });
                }
            };

            let samples = frame.samples.clone();
            self.ring.push(frame);
            if let Some(keyword) = self.wake.process(&samples) {
                info!("Wake word detected (keyword index {})", keyword);
                let conversation_id = self.shared.begin_capture_on_wake(Instant::now());
                // Fresh attempt: stale pre-roll (the wake phrase itself) and
                // any leftover utterance state are dropped.
                self.ring.clear();
                self.batcher.clear();
                self.pending_silence.clear();
                let _ = self.outbound.send(Outbound::Wake { conversation_id });
                self.discard_wake_ack_window();
                return Ok(());
            }
        }
        Ok(())
    }

    /// Read and discard input while the wake acknowledgement tone plays, so
    /// the tone does not register as user speech.
    fn discard_wake_ack_window(&mut self) {
        if self.wake_ack_delay.is_zero() {
            return;
        }
        let until = Instant::now() + self.wake_ack_delay;
        while Instant::now() < until {
            if self.input.read_frame().is_err() {
                break;
            }
        }
    }

    fn run_capturing(&mut self) {
        let attempt_id = match self.shared.conversation_id() {
            Some(id) => id,
            None => {
                warn!("Capturing with no conversation id; reverting to idle");
                self.shared.revert_to_wake_idle(Instant::now());
                return;
            }
        };
        info!("Capturing speech for conversation {}", attempt_id);
        self.detector.reset(Instant::now());

        while self.shared.state() == DeviceState::CapturingSpeech && !self.shared.is_shutdown() {
            let frame = match self.read_frame_recovering() {
                Ok(frame) => frame,
                Err(e) => {
                    // Recovery exhausted mid-turn: abandon the attempt, but
                    // ship everything already captured first.
                    error!("Audio input lost mid-capture: {:#}", e);
                    self.flush_pending_silence(&attempt_id);
                    let speech_detected = self.detector.has_valid_utterance();
                    self.finish_attempt(&attempt_id, speech_detected);
                    self.shared.revert_to_wake_idle(Instant::now());
                    return;
                }
            };

            let was_confirmed = self.detector.speech_confirmed();
            let event = self.detector.observe(frame.rms, Instant::now());
            match event {
                SpeechEvent::SpeechOnset => {
                    // Pre-roll leads the outbound stream so the audio that
                    // preceded debounce confirmation is not lost.
                    for buffered in self.ring.drain() {
                        self.push_frame(&attempt_id, buffered);
                    }
                    self.push_frame(&attempt_id, frame);
                }
                SpeechEvent::SpeechContinuing => {
                    self.flush_pending_silence(&attempt_id);
                    self.push_frame(&attempt_id, frame);
                }
                SpeechEvent::Silence => {
                    if self.detector.speech_confirmed() {
                        self.pending_silence.push(frame);
                    } else if was_confirmed {
                        // False start: the detector demoted itself back to
                        // onset detection. The held silence becomes pre-roll
                        // history for a potential second onset.
                        debug!("False start; returning to onset detection");
                        self.pending_silence.push(frame);
                        for held in std::mem::take(&mut self.pending_silence) {
                            self.ring.push(held);
                        }
                    } else {
                        self.ring.push(frame);
                    }
                }
                SpeechEvent::SpeechEnd => {
                    // The trailing silent run is not part of the utterance.
                    self.pending_silence.clear();
                    info!(
                        "End of utterance ({} speech frames)",
                        self.detector.state().speech_frames
                    );
                    self.finish_attempt(&attempt_id, true);
                    self.shared.await_orchestrator(Instant::now());
                    return;
                }
                SpeechEvent::Timeout => {
                    // Hard cutoff: keep the held silence so nothing captured
                    // before the transition is dropped.
                    self.flush_pending_silence(&attempt_id);
                    let speech_detected = self.detector.has_valid_utterance();
                    if speech_detected {
                        info!("Capture duration limit reached; ending turn");
                    } else {
                        info!("No usable speech found; ending turn");
                    }
                    self.finish_attempt(&attempt_id, speech_detected);
                    self.shared.await_orchestrator(Instant::now());
                    return;
                }
            }
        }

        // Early termination: a control message or shutdown pulled us out of
        // the capture state. Flush what we have under the cutoff rule.
        self.flush_pending_silence(&attempt_id);
        let speech_detected = self.detector.has_valid_utterance();
        self.finish_attempt(&attempt_id, speech_detected);
    }

    fn run_awaiting_orchestrator(&mut self) {
        debug!("Awaiting orchestrator command");
        while self.shared.state() == DeviceState::AwaitingOrchestrator && !self.shared.is_shutdown()
        {
            if self.shared.time_in_state(Instant::now()) > self.command_timeout {
                warn!(
                    "No orchestrator command within {:?}; reverting to wake-word listening",
                    self.command_timeout
                );
                self.shared.revert_to_wake_idle(Instant::now());
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Lightweight single-threshold gate for the multi-turn continuation:
    /// the user is expected to answer imminently, so the first frame above
    /// threshold opens capture with the pre-roll ring as lead-in. This
    /// asymmetry with the two-phase detector is deliberate — it trades
    /// debounce robustness for latency on a reply the user was just invited
    /// to give.
    fn run_awaiting_user_turn(&mut self) -> Result<(), FatalError> {
        debug!("Awaiting the user's next turn");
        while self.shared.state() == DeviceState::AwaitingUserTurn && !self.shared.is_shutdown() {
            if self.shared.time_in_state(Instant::now()) > self.user_turn_timeout {
                info!(
                    "User turn timed out after {:?}; reverting to wake-word listening",
                    self.user_turn_timeout
                );
                self.ring.clear();
                self.shared.revert_to_wake_idle(Instant::now());
                return Ok(());
            }

            let frame = match self.read_frame_recovering() {
                Ok(frame) => frame,
                Err(e) => {
                    return Err(FatalError::AudioInputUnavailable {
                        attempts: self.reopen_attempts,
                        message: format!("{:#}", e),
                    });
                }
            };

            let loud = frame.rms > self.silence_threshold_rms;
            self.ring.push(frame);
            if loud {
                if let Some(id) = self.shared.begin_capture_for_turn(Instant::now()) {
                    info!("User speech detected; capturing next turn for {}", id);
                    self.batcher.clear();
                    self.pending_silence.clear();
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// Route a frame into the batcher, emitting a batch when one fills. The
    /// conversation id is re-read at send time so outbound audio always
    /// carries the id currently believed valid.
    fn push_frame(&mut self, attempt_id: &str, frame: AudioFrame) {
        if let Some(frames) = self.batcher.accept(frame) {
            let conversation_id = self
                .shared
                .conversation_id()
                .unwrap_or_else(|| attempt_id.to_string());
            let _ = self.outbound.send(Outbound::Batch {
                conversation_id,
                frames,
            });
        }
    }

    fn flush_pending_silence(&mut self, attempt_id: &str) {
        for held in std::mem::take(&mut self.pending_silence) {
            self.push_frame(attempt_id, held);
        }
    }

    /// Flush any partial batch, publish the end-of-attempt marker, and hand
    /// the full-utterance buffer to the diagnostics writer.
    fn finish_attempt(&mut self, attempt_id: &str, speech_detected: bool) {
        let conversation_id = self
            .shared
            .conversation_id()
            .unwrap_or_else(|| attempt_id.to_string());

        if let Some(frames) = self.batcher.flush_partial() {
            let _ = self.outbound.send(Outbound::Batch {
                conversation_id: conversation_id.clone(),
                frames,
            });
        }
        let _ = self.outbound.send(Outbound::TurnEnd {
            conversation_id: conversation_id.clone(),
            speech_detected,
        });

        let utterance = self.batcher.take_utterance();
        if let Some(writer) = &self.utterance_writer {
            if !utterance.is_empty() {
                if let Err(e) = writer.write(&conversation_id, &utterance) {
                    warn!("Failed to write utterance dump: {:#}", e);
                }
            }
        }
        self.ring.clear();
        self.pending_silence.clear();
    }
}
