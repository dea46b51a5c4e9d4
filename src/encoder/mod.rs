// Video encoder session wrapper.
//
// `FrameEncoder` owns the writer-side state machine around an external
// encoder capability (`VideoSink`): configure exactly once, append pooled
// buffers with non-decreasing presentation timestamps while the sink reports
// readiness, then finalize once. The sink applies its own internal
// backpressure; a full sink rejects data rather than blocking the caller.

pub mod ffmpeg;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::frame::PixelBuffer;

pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory};

/// Output codec for the compressed video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    H264,
}

/// Encoder session configuration, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Output width in pixels (logical width × scale).
    pub width: u32,
    /// Output height in pixels (logical height × scale).
    pub height: u32,
    /// Target frame rate the producer paces itself to.
    pub frame_rate: u32,
    /// Average output bitrate in bits per second.
    pub bitrate_bps: u64,
    pub codec: Codec,
}

impl EncoderConfig {
    /// Bitrate factor applied per output pixel, carried over from the
    /// original recorder's tuning.
    const BITRATE_PER_PIXEL: f64 = 11.4;

    pub fn for_resolution(width: u32, height: u32, frame_rate: u32) -> Self {
        let bitrate_bps = (width as f64 * height as f64 * Self::BITRATE_PER_PIXEL) as u64;
        Self {
            width,
            height,
            frame_rate,
            bitrate_bps,
            codec: Codec::H264,
        }
    }

    fn validate(&self) -> Result<(), RecordError> {
        if self.width == 0 || self.height == 0 {
            return Err(RecordError::Config(format!(
                "invalid output resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(RecordError::Config("frame rate must be at least 1".into()));
        }
        Ok(())
    }
}

/// Lifecycle of one encoder session. No buffer may be appended once
/// `Finishing` begins, and only the first finalize call does any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStatus {
    Idle,
    Writing,
    Finishing,
    Completed,
    Failed,
    Cancelled,
}

/// The external encoder capability: accepts raw BGRA buffers and writes a
/// compressed elementary stream into a container file.
///
/// `append` returns `Ok(false)` when the sink's internal queue is full; the
/// caller drops the frame. It must never block the runtime: a slow sink
/// suspends or reports not-ready. `finish` flushes and closes the container.
#[async_trait]
pub trait VideoSink: Send {
    fn is_ready(&self) -> bool;

    async fn append(&mut self, frame: &PixelBuffer, pts: Duration) -> Result<bool, RecordError>;

    async fn finish(&mut self) -> Result<(), RecordError>;
}

/// Creates a sink for one encoder session. Injected into the pipelines so
/// tests can substitute an in-process double.
pub trait SinkFactory: Send + Sync {
    fn create(
        &self,
        config: &EncoderConfig,
        output: &Path,
        rotation_degrees: i32,
    ) -> Result<Box<dyn VideoSink>, RecordError>;
}

/// Writer-side session state around a `VideoSink`.
pub struct FrameEncoder {
    status: EncoderStatus,
    sink: Option<Box<dyn VideoSink>>,
    output_path: PathBuf,
    last_pts: Option<Duration>,
    frames_appended: u64,
}

impl FrameEncoder {
    /// Configures a session; must be called exactly once before any append.
    pub fn configure(
        config: &EncoderConfig,
        sink: Box<dyn VideoSink>,
        output_path: PathBuf,
    ) -> Result<Self, RecordError> {
        config.validate()?;
        info!(
            "encoder session configured: {}x{} @ {} fps, {} bps -> {}",
            config.width,
            config.height,
            config.frame_rate,
            config.bitrate_bps,
            output_path.display()
        );
        Ok(Self {
            status: EncoderStatus::Writing,
            sink: Some(sink),
            output_path,
            last_pts: None,
            frames_appended: 0,
        })
    }

    pub fn status(&self) -> EncoderStatus {
        self.status
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn frames_appended(&self) -> u64 {
        self.frames_appended
    }

    /// Presentation timestamp of the most recently appended frame.
    pub fn last_pts(&self) -> Option<Duration> {
        self.last_pts
    }

    /// Appends one frame. Valid only while the session is `Writing` and the
    /// sink is ready for more data; otherwise the frame is rejected and the
    /// caller drops it. Timestamps must be non-decreasing within a session.
    pub async fn append(&mut self, frame: &PixelBuffer, pts: Duration) -> Result<(), RecordError> {
        if self.status != EncoderStatus::Writing {
            return Err(RecordError::EncoderRejected);
        }
        let sink = self.sink.as_mut().ok_or(RecordError::EncoderRejected)?;
        if !sink.is_ready() {
            return Err(RecordError::EncoderRejected);
        }
        if let Some(last) = self.last_pts {
            if pts < last {
                warn!(
                    "non-monotonic pts {:?} after {:?}, frame rejected",
                    pts, last
                );
                return Err(RecordError::EncoderRejected);
            }
        }

        if sink.append(frame, pts).await? {
            self.last_pts = Some(pts);
            self.frames_appended += 1;
            Ok(())
        } else {
            debug!("sink queue full at {:?}, frame dropped", pts);
            Err(RecordError::EncoderRejected)
        }
    }

    /// Finalizes the session. The first call transitions
    /// `Writing → Finishing → {Completed | Failed}`; later calls observe the
    /// terminal status without touching the sink again. The sink is dropped
    /// on any terminal state so encoder resources are always released.
    pub async fn finish(&mut self) -> Result<EncoderStatus, RecordError> {
        match self.status {
            EncoderStatus::Writing => {}
            EncoderStatus::Completed => return Ok(EncoderStatus::Completed),
            status @ (EncoderStatus::Failed | EncoderStatus::Cancelled) => {
                return Err(RecordError::FinalizeFailed {
                    status,
                    reason: "session already ended".into(),
                })
            }
            status => {
                return Err(RecordError::FinalizeFailed {
                    status,
                    reason: "finish called in a non-writing state".into(),
                })
            }
        }

        self.status = EncoderStatus::Finishing;
        let mut sink = self.sink.take().ok_or(RecordError::FinalizeFailed {
            status: EncoderStatus::Failed,
            reason: "sink missing".into(),
        })?;

        match sink.finish().await {
            Ok(()) => {
                self.status = EncoderStatus::Completed;
                info!(
                    "encoder session completed: {} frames -> {}",
                    self.frames_appended,
                    self.output_path.display()
                );
                Ok(EncoderStatus::Completed)
            }
            Err(e) => {
                self.status = EncoderStatus::Failed;
                Err(RecordError::FinalizeFailed {
                    status: EncoderStatus::Failed,
                    reason: e.to_string(),
                })
            }
        }
    }
}
