use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::vad::VadConfig;

/// Top-level configuration, loaded from a TOML file. Every section has
/// defaults so a partial (or missing) file still yields a runnable setup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
    pub vad: VadSettings,
    pub capture: CaptureConfig,
    pub turn: TurnConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Identifier of the edge device; control commands are addressed to it
    pub device_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "aria-voice".to_string(),
            device_id: "edge-001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
    /// Publish attempts before giving up (reconnecting between attempts)
    pub publish_retry_attempts: u32,
    /// Base backoff between publish attempts; grows linearly per attempt
    pub publish_backoff_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            publish_retry_attempts: 5,
            publish_backoff_ms: 200,
        }
    }
}

impl TransportConfig {
    pub fn publish_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Directory for per-utterance WAV dumps; disabled when unset
    pub utterance_dump_dir: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 512,
            utterance_dump_dir: None,
        }
    }
}

/// Activity-detector tunables. These are the file-facing mirror of
/// [`VadConfig`]; `detector_config()` converts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    /// RMS at or below which a frame counts as silent
    pub silence_threshold_rms: f64,
    /// Consecutive loud frames required to confirm speech onset
    pub onset_frames: u32,
    /// Minimum speech frames for a valid utterance
    pub min_utterance_frames: u32,
    /// Consecutive silent frames after speech that end the utterance
    pub end_silence_frames: u32,
    /// Silent frames tolerated before any speech has started
    pub abandon_silence_frames: u32,
    /// Hard ceiling on one capture attempt
    pub max_capture_secs: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            silence_threshold_rms: 350.0,
            onset_frames: 1,
            min_utterance_frames: 30,
            end_silence_frames: 125,
            abandon_silence_frames: 150,
            max_capture_secs: 10,
        }
    }
}

impl VadSettings {
    pub fn detector_config(&self) -> VadConfig {
        VadConfig {
            silence_threshold_rms: self.silence_threshold_rms,
            onset_frames: self.onset_frames,
            min_utterance_frames: self.min_utterance_frames,
            end_silence_frames: self.end_silence_frames,
            abandon_silence_frames: self.abandon_silence_frames,
            max_capture_duration: Duration::from_secs(self.max_capture_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames accumulated before a batch is sent
    pub batch_frames: usize,
    /// Depth of the pre-roll ring
    pub pre_roll_frames: usize,
    /// How long to wait for an orchestrator command before reverting to idle
    pub command_timeout_secs: u64,
    /// How long to wait for the user's next turn before reverting to idle
    pub user_turn_timeout_secs: u64,
    /// Input discarded after wake detection while the acknowledgement tone plays
    pub wake_ack_delay_ms: u64,
    /// Stream reopen attempts before the input counts as unavailable
    pub reopen_attempts: u32,
    /// Base backoff between reopen attempts; grows linearly per attempt
    pub reopen_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            batch_frames: 15,
            pre_roll_frames: 3,
            command_timeout_secs: 25,
            user_turn_timeout_secs: 7,
            wake_ack_delay_ms: 1500,
            reopen_attempts: 5,
            reopen_backoff_ms: 250,
        }
    }
}

impl CaptureConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn user_turn_timeout(&self) -> Duration {
        Duration::from_secs(self.user_turn_timeout_secs)
    }

    pub fn wake_ack_delay(&self) -> Duration {
        Duration::from_millis(self.wake_ack_delay_ms)
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Empty final transcripts arriving before this much of the turn has
    /// elapsed are discarded and transcription is re-armed
    pub min_turn_duration_before_empty_accept_secs: f64,
    /// Hard bound on one transcription turn
    pub turn_timeout_secs: u64,
    /// Phrases that end the conversation when present in a final transcript
    pub goodbye_phrases: Vec<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            min_turn_duration_before_empty_accept_secs: 5.5,
            turn_timeout_secs: 15,
            goodbye_phrases: [
                "goodbye",
                "bye",
                "cya",
                "see ya",
                "sounds good",
                "that's all",
                "thank you that's all",
                "later",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl TurnConfig {
    pub fn min_turn_duration_before_empty_accept(&self) -> Duration {
        Duration::from_secs_f64(self.min_turn_duration_before_empty_accept_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    /// Root directory of the filesystem audio store
    pub storage_dir: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            storage_dir: "audio-store".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let cfg = Config::default();
        assert_eq!(cfg.vad.silence_threshold_rms, 350.0);
        assert_eq!(cfg.vad.onset_frames, 1);
        assert_eq!(cfg.vad.min_utterance_frames, 30);
        assert_eq!(cfg.vad.end_silence_frames, 125);
        assert_eq!(cfg.vad.abandon_silence_frames, 150);
        assert_eq!(cfg.capture.batch_frames, 15);
        assert_eq!(cfg.capture.pre_roll_frames, 3);
        assert_eq!(cfg.capture.command_timeout_secs, 25);
        assert_eq!(cfg.capture.user_turn_timeout_secs, 7);
        assert_eq!(cfg.turn.turn_timeout_secs, 15);
        assert!(cfg.turn.goodbye_phrases.contains(&"goodbye".to_string()));
    }

    #[test]
    fn partial_file_keeps_defaults_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[vad]\nsilence_threshold_rms = 500.0\n").unwrap();

        let cfg = Config::load(path.with_extension("").to_str().unwrap()).unwrap();
        assert_eq!(cfg.vad.silence_threshold_rms, 500.0);
        assert_eq!(cfg.vad.end_silence_frames, 125);
        assert_eq!(cfg.capture.batch_frames, 15);
    }

    #[test]
    fn durations_convert() {
        let cfg = Config::default();
        assert_eq!(cfg.capture.command_timeout(), Duration::from_secs(25));
        assert_eq!(
            cfg.turn.min_turn_duration_before_empty_accept(),
            Duration::from_secs_f64(5.5)
        );
        assert_eq!(
            cfg.vad.detector_config().max_capture_duration,
            Duration::from_secs(10)
        );
    }
}
