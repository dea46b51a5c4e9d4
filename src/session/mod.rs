// Recording session orchestration.
//
// Owns one capture pipeline, one audio recorder, and the muxer, all injected
// at construction. `finish` runs the whole completion chain that the
// original app spread across delegates: stop video, end audio, merge, and
// return the final artifact.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::audio::{AudioRecorder, AudioSource};
use crate::mux::{MergedArtifact, Muxer};
use crate::pipeline::{CapturePipeline, PipelineState};

pub struct RecordingSession {
    pipeline: Box<dyn CapturePipeline>,
    audio: AudioRecorder,
    audio_source: Option<Box<dyn AudioSource>>,
    muxer: Muxer,
}

impl RecordingSession {
    pub fn new(
        pipeline: Box<dyn CapturePipeline>,
        audio: AudioRecorder,
        audio_source: Box<dyn AudioSource>,
        muxer: Muxer,
    ) -> Self {
        Self {
            pipeline,
            audio,
            audio_source: Some(audio_source),
            muxer,
        }
    }

    /// Starts video capture, then the parallel audio recording.
    pub async fn start(&mut self) -> Result<()> {
        self.pipeline.start().await.context("failed to start capture")?;

        let source = self
            .audio_source
            .take()
            .context("audio source already consumed")?;
        if let Err(e) = self.audio.begin(source).await {
            // Video without audio is still a usable session; the merge will
            // simply fail later if no track was produced, so surface now.
            let _ = self.pipeline.close().await;
            return Err(e).context("failed to start audio recording");
        }

        info!("recording session started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.pipeline.pause()?;
        self.audio.pause();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.pipeline.resume()?;
        self.audio.resume();
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Stops both tracks and merges them into the final artifact.
    pub async fn finish(&mut self) -> Result<MergedArtifact> {
        let video = match self.pipeline.stop().await {
            Ok(video) => video,
            Err(e) => {
                // The audio task is wound down either way; its intermediate
                // stays on disk next to the video temp.
                if let Err(audio_err) = self.audio.end().await {
                    warn!("audio finalize after video failure failed: {}", audio_err);
                }
                return Err(e).context("video finalize failed");
            }
        };
        let audio = self.audio.end().await.context("audio finalize failed")?;

        let merged = self
            .muxer
            .merge(&video.path, &audio.path)
            .await
            .context("merge failed")?;

        info!(
            "recording session finished: {:?} -> {}",
            video.duration,
            merged.path.display()
        );
        Ok(merged)
    }

    /// Abandons the session (e.g. app backgrounding): discards the video,
    /// ends the audio, and deletes its intermediate.
    pub async fn abandon(&mut self) -> Result<()> {
        if let Err(e) = self.pipeline.close().await {
            warn!("pipeline close during abandon failed: {}", e);
        }
        let audio = self.audio.end().await?;
        if audio.path.exists() {
            std::fs::remove_file(&audio.path)?;
        }
        info!("recording session abandoned");
        Ok(())
    }
}
