// Capture pipeline orchestration.
//
// Two capture strategies share one interface: `ScreenPipeline` renders on a
// display-paced clock with double-buffered render/append stages, and
// `TimerPipeline` renders inline on a fixed-interval timer with a single
// render lock. Both own the
// Idle → Configuring → Recording ⇄ Paused → Finishing → {Completed | Failed}
// state machine, with `Closed` as the discard terminal.

pub mod screen;
pub mod timer;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::encoder::Codec;
use crate::error::RecordError;

pub use screen::ScreenPipeline;
pub use timer::TimerPipeline;

/// Upper bound on the configurable frame rate.
pub const MAX_FRAME_RATE: u32 = 35;

/// Default target frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 10;

/// Geometry and pacing for one capture pipeline, fixed at construction.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Logical surface width in points.
    pub width: u32,
    /// Logical surface height in points.
    pub height: u32,
    /// Rendering density; output resolution is logical size × scale.
    pub scale: u32,
    /// Target frames per second, clamped to `1..=MAX_FRAME_RATE`.
    pub frame_rate: u32,
    /// Pixel buffer pool capacity.
    pub pool_capacity: usize,
    pub codec: Codec,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 375,
            height: 667,
            scale: 2,
            frame_rate: DEFAULT_FRAME_RATE,
            pool_capacity: 3,
            codec: Codec::H264,
        }
    }
}

impl CaptureConfig {
    pub fn output_width(&self) -> u32 {
        self.width * self.scale
    }

    pub fn output_height(&self) -> u32 {
        self.height * self.scale
    }

    pub fn effective_frame_rate(&self) -> u32 {
        self.frame_rate.clamp(1, MAX_FRAME_RATE)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.effective_frame_rate() as f64)
    }
}

/// State machine of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Configuring,
    Recording,
    Paused,
    Finishing,
    Completed,
    Failed,
    Closed,
}

/// A finished, persisted video recording (video track only, pre-merge).
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub path: PathBuf,
    /// Playback duration, with paused intervals excised.
    pub duration: Duration,
    pub frames_appended: u64,
}

/// Common surface of the two capture strategies. Selected at configuration
/// time; the pool, encoder, and muxer components are shared underneath.
#[async_trait]
pub trait CapturePipeline: Send {
    /// Valid only from `Idle`; allocates the pool and encoder session and
    /// starts the frame clock. Fails with `AlreadyRecording` from any other
    /// state, without mutating it.
    async fn start(&mut self) -> Result<(), RecordError>;

    /// Valid from `Recording`. Paused time is excised from the playback
    /// timeline.
    fn pause(&mut self) -> Result<(), RecordError>;

    /// Valid from `Paused`.
    fn resume(&mut self) -> Result<(), RecordError>;

    /// Valid from `Recording` or `Paused`. Stops the clock, drains in-flight
    /// stages, finalizes the encoder, and moves the artifact into the store.
    async fn stop(&mut self) -> Result<RecordingArtifact, RecordError>;

    /// Like `stop`, but discards the artifact (abandoned recording).
    async fn close(&mut self) -> Result<(), RecordError>;

    fn state(&self) -> PipelineState;
}
