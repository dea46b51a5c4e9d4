pub mod recorder;
pub mod source;

pub use recorder::{AudioArtifact, AudioRecorder};
pub use source::{AudioFrame, AudioSource, SilenceSource};
