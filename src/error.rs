use thiserror::Error;

/// Unrecoverable local faults.
///
/// Everything else in this crate is either retried in place (dead audio
/// stream, failed publish) or absorbed by timeouts (slow or empty remote
/// results). A `FatalError` means the device cannot keep operating and the
/// process should shut down after notifying the orchestrator.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("audio input unavailable after {attempts} reopen attempts: {message}")]
    AudioInputUnavailable { attempts: u32, message: String },
}
