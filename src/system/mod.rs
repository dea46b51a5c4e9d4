// System-provided screen recorder collaborator.
//
// The platform recorder is an opaque capability: it either produces a
// finished output artifact or an error. Its result slots in as an
// alternative `MergedArtifact` source, so callers that prefer the system
// path share the rest of the recording surface.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::mux::MergedArtifact;

/// Output of the system recorder: an already-finished recording.
#[derive(Debug, Clone)]
pub struct PreviewArtifact {
    pub path: PathBuf,
}

impl From<PreviewArtifact> for MergedArtifact {
    fn from(preview: PreviewArtifact) -> Self {
        MergedArtifact { path: preview.path }
    }
}

/// Contract of the platform screen recorder.
#[async_trait]
pub trait SystemRecorder: Send + Sync {
    /// Whether the system recorder can be used at all on this device.
    fn is_available(&self) -> bool;

    async fn start_recording(&mut self) -> Result<()>;

    async fn stop_recording(&mut self) -> Result<PreviewArtifact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedRecorder {
        recording: bool,
    }

    #[async_trait]
    impl SystemRecorder for CannedRecorder {
        fn is_available(&self) -> bool {
            true
        }

        async fn start_recording(&mut self) -> Result<()> {
            self.recording = true;
            Ok(())
        }

        async fn stop_recording(&mut self) -> Result<PreviewArtifact> {
            if !self.recording {
                anyhow::bail!("not recording");
            }
            self.recording = false;
            Ok(PreviewArtifact {
                path: PathBuf::from("preview.mp4"),
            })
        }
    }

    #[tokio::test]
    async fn preview_feeds_the_shared_artifact_surface() {
        let mut recorder = CannedRecorder { recording: false };
        assert!(recorder.is_available());
        assert!(recorder.stop_recording().await.is_err());

        recorder.start_recording().await.unwrap();
        let preview = recorder.stop_recording().await.unwrap();
        let merged: MergedArtifact = preview.into();
        assert_eq!(merged.path, PathBuf::from("preview.mp4"));
    }
}
