// H.264 encoding via an ffmpeg child process.
//
// Raw BGRA frames are piped to ffmpeg's stdin through a bounded channel
// serviced by a dedicated writer thread. The channel bound is the sink's
// internal queue: when it is full, `append` reports not-ready and the caller
// drops the frame instead of stalling the capture clock.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Codec, EncoderConfig, SinkFactory, VideoSink};
use crate::error::RecordError;
use crate::frame::PixelBuffer;

/// Frames buffered between `append` and the ffmpeg stdin writer.
const QUEUE_DEPTH: usize = 4;

/// `VideoSink` backed by an `ffmpeg` child process reading rawvideo BGRA.
///
/// ffmpeg treats stdin as a constant-rate stream, so presentation timestamps
/// are advisory here; pause excision still holds because paused ticks never
/// produce frames.
pub struct FfmpegSink {
    tx: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    child: Option<Child>,
}

impl FfmpegSink {
    pub fn spawn(
        config: &EncoderConfig,
        output: &Path,
        rotation_degrees: i32,
    ) -> Result<Self, RecordError> {
        let codec = match config.codec {
            Codec::H264 => "libx264",
        };

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgra",
            "-s",
            &format!("{}x{}", config.width, config.height),
            "-r",
            &config.frame_rate.to_string(),
            "-i",
            "-",
            "-an",
            "-c:v",
            codec,
            "-preset",
            "veryfast",
            "-tune",
            "zerolatency",
            "-b:v",
            &config.bitrate_bps.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        if rotation_degrees != 0 {
            cmd.args([
                "-metadata:s:v",
                &format!("rotate={}", rotation_degrees),
            ]);
        }
        cmd.arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| RecordError::Config(format!("failed to start ffmpeg: {}", e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordError::Config("ffmpeg stdin unavailable".into()))?;

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(QUEUE_DEPTH);
        let writer = std::thread::spawn(move || {
            for frame in rx {
                stdin.write_all(&frame)?;
            }
            // Dropping stdin signals end of stream to ffmpeg.
            drop(stdin);
            Ok(())
        });

        info!(
            "ffmpeg encoder started: {}x{} @ {} fps -> {}",
            config.width,
            config.height,
            config.frame_rate,
            output.display()
        );

        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
            child: Some(child),
        })
    }
}

#[async_trait]
impl VideoSink for FfmpegSink {
    fn is_ready(&self) -> bool {
        self.tx.is_some()
    }

    async fn append(&mut self, frame: &PixelBuffer, _pts: Duration) -> Result<bool, RecordError> {
        let Some(tx) = self.tx.as_ref() else {
            return Ok(false);
        };
        match tx.try_send(frame.data().to_vec()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => {
                warn!("ffmpeg writer thread gone, frame dropped");
                Ok(false)
            }
        }
    }

    async fn finish(&mut self) -> Result<(), RecordError> {
        // Closing the channel drains the queue and closes ffmpeg's stdin.
        self.tx.take();
        let writer = self.writer.take();
        let child = self.child.take();

        tokio::task::spawn_blocking(move || -> Result<(), RecordError> {
            if let Some(writer) = writer {
                writer
                    .join()
                    .map_err(|_| RecordError::Config("ffmpeg writer thread panicked".into()))?
                    .map_err(RecordError::Io)?;
            }
            if let Some(mut child) = child {
                let status = child.wait().map_err(RecordError::Io)?;
                if !status.success() {
                    return Err(RecordError::Config(format!(
                        "ffmpeg exited with {}",
                        status
                    )));
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| RecordError::Config(format!("ffmpeg finalize task failed: {}", e)))??;

        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Un-finalized sessions close the pipe so the child can exit; the
        // half-written file is the caller's to discard.
        self.tx.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait() {
                warn!("failed to reap ffmpeg child: {}", e);
            }
        }
    }
}

/// Default production factory used by the pipelines.
pub struct FfmpegSinkFactory;

impl SinkFactory for FfmpegSinkFactory {
    fn create(
        &self,
        config: &EncoderConfig,
        output: &Path,
        rotation_degrees: i32,
    ) -> Result<Box<dyn VideoSink>, RecordError> {
        Ok(Box::new(FfmpegSink::spawn(config, output, rotation_degrees)?))
    }
}
