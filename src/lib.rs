pub mod audio;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod mux;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod system;

pub use audio::{AudioArtifact, AudioFrame, AudioRecorder, AudioSource, SilenceSource};
pub use config::RecorderConfig;
pub use encoder::{
    Codec, EncoderConfig, EncoderStatus, FfmpegSinkFactory, FrameEncoder, SinkFactory, VideoSink,
};
pub use error::RecordError;
pub use frame::{FrameSource, Orientation, PixelBuffer, PixelBufferPool, TestPatternSource};
pub use mux::{FfmpegMerger, MergeBackend, MergedArtifact, Muxer};
pub use pipeline::{
    CaptureConfig, CapturePipeline, PipelineState, RecordingArtifact, ScreenPipeline,
    TimerPipeline,
};
pub use session::RecordingSession;
pub use store::RecordingStore;
pub use system::{PreviewArtifact, SystemRecorder};
