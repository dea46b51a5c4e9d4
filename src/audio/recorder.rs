// WAV audio recorder running in parallel with video capture.
//
// Frames keep arriving from the source while paused; the writer task simply
// skips them, so resume is immediate. `end` only tears the recorder down if
// it is active (or paused after having been active), but it resolves the
// completion in every case so the merge step can always proceed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::source::{AudioSource, BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};

/// A finished audio track.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub duration: Duration,
}

pub struct AudioRecorder {
    path: PathBuf,
    paused: Arc<AtomicBool>,
    source: Option<Box<dyn AudioSource>>,
    writer_task: Option<JoinHandle<Result<u64>>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl AudioRecorder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            paused: Arc::new(AtomicBool::new(false)),
            source: None,
            writer_task: None,
            stop_tx: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Starts the source and the WAV writer task.
    pub async fn begin(&mut self, mut source: Box<dyn AudioSource>) -> Result<()> {
        if self.writer_task.is_some() {
            anyhow::bail!("audio recorder already running");
        }

        let mut rx = source.start().await.context("failed to start audio source")?;
        info!(
            "audio recording started ({}): {} Hz, {} ch, {} bit -> {}",
            source.name(),
            SAMPLE_RATE,
            CHANNELS,
            BITS_PER_SAMPLE,
            self.path.display()
        );

        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&self.path, spec)
            .with_context(|| format!("failed to create WAV file {:?}", self.path))?;

        let paused = Arc::clone(&self.paused);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut samples_written = 0u64;
            loop {
                tokio::select! {
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        if paused.load(Ordering::SeqCst) {
                            continue;
                        }
                        for &sample in &frame.samples {
                            writer
                                .write_sample(sample)
                                .context("failed to write audio sample")?;
                        }
                        samples_written += frame.samples.len() as u64;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            writer.finalize().context("failed to finalize WAV file")?;
            Ok(samples_written)
        });

        self.source = Some(source);
        self.writer_task = Some(task);
        self.stop_tx = Some(stop_tx);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn pause(&mut self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("audio recording paused");
    }

    pub fn resume(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("audio recording resumed");
    }

    pub fn is_active(&self) -> bool {
        self.writer_task.is_some()
    }

    /// Stops the recorder if it was ever started; otherwise a no-op. Either
    /// way the completion resolves with the artifact so the muxer can
    /// proceed.
    pub async fn end(&mut self) -> Result<AudioArtifact> {
        let duration = if let Some(task) = self.writer_task.take() {
            if let Some(mut source) = self.source.take() {
                if let Err(e) = source.stop().await {
                    warn!("audio source stop failed: {}", e);
                }
            }
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            let samples = task.await.context("audio writer task panicked")??;
            Duration::from_secs_f64(samples as f64 / SAMPLE_RATE as f64)
        } else {
            info!("audio recorder was not active, signalling completion");
            Duration::ZERO
        };

        info!(
            "audio recording ended: {:?} -> {}",
            duration,
            self.path.display()
        );
        Ok(AudioArtifact {
            path: self.path.clone(),
            duration,
        })
    }
}
