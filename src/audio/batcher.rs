use super::frame::AudioFrame;

/// Accumulates utterance frames into fixed-size outbound batches, alongside
/// an unbounded full-utterance buffer kept for diagnostics.
///
/// Every frame enters through [`TurnBatcher::accept`], which feeds both
/// buffers in a single step. Invariant: concatenating all emitted batches
/// (full ones plus the final partial flush) reproduces the full-utterance
/// buffer exactly, in sequence order.
#[derive(Debug)]
pub struct TurnBatcher {
    batch: Vec<AudioFrame>,
    utterance: Vec<AudioFrame>,
    batch_frames: usize,
}

impl TurnBatcher {
    pub fn new(batch_frames: usize) -> Self {
        Self {
            batch: Vec::with_capacity(batch_frames),
            utterance: Vec::new(),
            batch_frames: batch_frames.max(1),
        }
    }

    /// Add a frame to the current turn. Returns a full batch once the batch
    /// size is reached.
    pub fn accept(&mut self, frame: AudioFrame) -> Option<Vec<AudioFrame>> {
        self.utterance.push(frame.clone());
        self.batch.push(frame);
        if self.batch.len() >= self.batch_frames {
            Some(std::mem::take(&mut self.batch))
        } else {
            None
        }
    }

    /// Flush whatever is buffered short of a full batch
    pub fn flush_partial(&mut self) -> Option<Vec<AudioFrame>> {
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }

    /// Hand off the accumulated full-utterance buffer and clear it
    pub fn take_utterance(&mut self) -> Vec<AudioFrame> {
        std::mem::take(&mut self.utterance)
    }

    /// Drop all buffered audio (start of a fresh capture attempt)
    pub fn clear(&mut self) {
        self.batch.clear();
        self.utterance.clear();
    }

    pub fn utterance_len(&self) -> usize {
        self.utterance.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame::new(vec![sequence as i16; 8], sequence)
    }

    #[test]
    fn emits_full_batches_at_size() {
        let mut batcher = TurnBatcher::new(3);
        assert!(batcher.accept(frame(0)).is_none());
        assert!(batcher.accept(frame(1)).is_none());
        let batch = batcher.accept(frame(2)).expect("third frame fills batch");
        assert_eq!(batch.len(), 3);
        assert!(batcher.accept(frame(3)).is_none());
    }

    #[test]
    fn partial_flush_drains_remainder() {
        let mut batcher = TurnBatcher::new(4);
        batcher.accept(frame(0));
        batcher.accept(frame(1));
        let partial = batcher.flush_partial().expect("two frames pending");
        assert_eq!(partial.len(), 2);
        assert!(batcher.flush_partial().is_none());
    }

    #[test]
    fn flushed_batches_reproduce_the_utterance() {
        let mut batcher = TurnBatcher::new(4);
        let mut flushed = Vec::new();
        for sequence in 0..10 {
            if let Some(batch) = batcher.accept(frame(sequence)) {
                flushed.extend(batch);
            }
        }
        if let Some(batch) = batcher.flush_partial() {
            flushed.extend(batch);
        }

        let utterance = batcher.take_utterance();
        assert_eq!(flushed, utterance);
        let sequences: Vec<u64> = flushed.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn clear_drops_everything() {
        let mut batcher = TurnBatcher::new(4);
        batcher.accept(frame(0));
        batcher.clear();
        assert!(batcher.flush_partial().is_none());
        assert!(batcher.take_utterance().is_empty());
    }
}
