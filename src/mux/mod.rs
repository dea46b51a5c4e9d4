// Audio/video merge.
//
// Builds one output container with the full video track and the full audio
// track, both starting at time zero. Tracks keep their own durations; they
// are not trimmed to the shorter of the two. On success the export is moved
// into the recordings store and both intermediates are deleted; on failure
// the intermediates are preserved for diagnostics and no retry is attempted.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::RecordError;
use crate::store::RecordingStore;

/// The final merged container file.
#[derive(Debug, Clone)]
pub struct MergedArtifact {
    pub path: PathBuf,
}

/// Export capability seam: writes `video` + `audio` into `output`.
#[async_trait]
pub trait MergeBackend: Send + Sync {
    async fn export(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Default backend: ffmpeg passthrough for video, AAC for the audio track.
/// Deliberately no `-shortest`: track durations are preserved as-is.
pub struct FfmpegMerger;

#[async_trait]
impl MergeBackend for FfmpegMerger {
    async fn export(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let video = video.to_path_buf();
        let audio = audio.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let status = Command::new("ffmpeg")
                .arg("-y")
                .arg("-i")
                .arg(&video)
                .arg("-i")
                .arg(&audio)
                .args(["-c:v", "copy", "-c:a", "aac", "-movflags", "+faststart"])
                .arg(&output)
                .status()?;
            if !status.success() {
                anyhow::bail!("ffmpeg merge exited with {}", status);
            }
            Ok(())
        })
        .await?
    }
}

/// Merges a finished video track and a finished audio track into one
/// timeline-aligned artifact in the recordings store.
pub struct Muxer {
    store: RecordingStore,
    backend: Box<dyn MergeBackend>,
}

impl Muxer {
    pub fn new(store: RecordingStore) -> Self {
        Self {
            store,
            backend: Box::new(FfmpegMerger),
        }
    }

    pub fn with_backend(store: RecordingStore, backend: Box<dyn MergeBackend>) -> Self {
        Self { store, backend }
    }

    pub async fn merge(&self, video: &Path, audio: &Path) -> Result<MergedArtifact, RecordError> {
        let export = self.store.temp_export_path();

        if let Err(e) = self.backend.export(video, audio, &export).await {
            // Intermediates stay in place for diagnostics.
            warn!("merge export failed: {}", e);
            return Err(RecordError::Merge(e.to_string()));
        }

        let path = self.store.persist(&export)?;
        self.store.discard(video)?;
        self.store.discard(audio)?;
        info!("merged recording: {}", path.display());

        Ok(MergedArtifact { path })
    }
}
