use thiserror::Error;

use crate::encoder::EncoderStatus;

/// Errors surfaced by the recording pipeline.
///
/// Per-frame conditions (`PoolExhausted`, `EncoderRejected`) are absorbed at
/// the frame level: the frame is dropped, the session continues. Session
/// level failures (`Config`, `FinalizeFailed`, `Merge`) always reach the
/// caller, and nothing in this crate retries automatically.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,

    #[error("encoder configuration failed: {0}")]
    Config(String),

    #[error("pixel buffer pool exhausted, frame dropped")]
    PoolExhausted,

    #[error("encoder not ready for more data, frame dropped")]
    EncoderRejected,

    #[error("encoder finalize ended in {status:?}: {reason}")]
    FinalizeFailed { status: EncoderStatus, reason: String },

    #[error("merge export failed: {0}")]
    Merge(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
