use anyhow::Result;

/// Blocking microphone abstraction owned by the capture thread.
///
/// `read_frame` returns one fixed-length block of samples and must not block
/// longer than the hardware buffer (tens of milliseconds). A failed read
/// leaves the stream in an unknown state; callers recover by calling
/// `reopen` rather than reusing it.
pub trait AudioInput: Send {
    fn read_frame(&mut self) -> Result<Vec<i16>>;

    /// Tear down and re-establish the underlying stream
    fn reopen(&mut self) -> Result<()>;
}

/// Wake-phrase model. Consumes one frame of samples and reports the index of
/// the detected keyword, if any.
pub trait WakeWordDetector: Send {
    fn process(&mut self, samples: &[i16]) -> Option<usize>;
}

/// Speaker-side playback of one complete WAV reply.
///
/// Implementations block until playback finishes. Callers serialize access
/// behind a lock so replies can never overlap.
pub trait ReplyPlayer: Send {
    fn play(&mut self, wav_bytes: &[u8]) -> Result<()>;
}
