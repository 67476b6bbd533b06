use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use super::frame::AudioFrame;

/// Writes a completed utterance to disk as a 16-bit PCM WAV.
///
/// This is the diagnostics sink for the full-utterance buffer: one file per
/// capture attempt, named by timestamp and conversation id.
pub struct UtteranceWriter {
    output_dir: PathBuf,
    sample_rate: u32,
    channels: u16,
}

impl UtteranceWriter {
    pub fn new(output_dir: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).context("Failed to create utterance dump directory")?;

        Ok(Self {
            output_dir,
            sample_rate,
            channels,
        })
    }

    pub fn write(&self, conversation_id: &str, frames: &[AudioFrame]) -> Result<PathBuf> {
        if frames.is_empty() {
            anyhow::bail!("no frames to write");
        }

        let short_id = conversation_id
            .split('-')
            .next()
            .unwrap_or(conversation_id);
        let filename = format!(
            "utterance-{}-{}.wav",
            chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"),
            short_id
        );
        let path = self.output_dir.join(filename);

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for frame in frames {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Saved utterance dump: {:?} ({} frames)",
            path,
            frames.len()
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_wav_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let writer = UtteranceWriter::new(dir.path(), 16000, 1).unwrap();

        let frames = vec![
            AudioFrame::new(vec![100, -200, 300], 0),
            AudioFrame::new(vec![-400, 500, -600], 1),
        ];
        let path = writer.write("abc-123", &frames).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -200, 300, -400, 500, -600]);
    }

    #[test]
    fn empty_utterance_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = UtteranceWriter::new(dir.path(), 16000, 1).unwrap();
        assert!(writer.write("abc", &[]).is_err());
    }
}
