use anyhow::Result;
use tokio::sync::mpsc;

/// One transcription result from the streaming service
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    /// Interim results refine earlier text; only final results end a turn
    pub is_final: bool,
}

/// Handle to one live transcription stream: PCM bytes go in, interim and
/// final transcripts come out. Dropping the handle cancels the stream.
pub struct TranscriptionStream {
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    pub results_rx: mpsc::Receiver<TranscriptResult>,
}

/// Streaming speech-to-text service
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn start_stream(&self) -> Result<TranscriptionStream>;
}

/// Text-in, text-out response generation
#[async_trait::async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// One synthesized spoken reply
#[derive(Debug, Clone)]
pub struct SynthesizedReply {
    /// Complete WAV file bytes
    pub wav_bytes: Vec<u8>,
    pub duration_secs: f64,
}

/// Text-to-speech service
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedReply>;
}
