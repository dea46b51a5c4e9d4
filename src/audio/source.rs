// Audio capture seam.
//
// A source delivers PCM frames over a channel; the recorder owns the
// receiving side. The device settings are fixed crate-wide (mono, 16-bit
// linear PCM, 8 kHz) so the audio track lines up with the video merge.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Fixed capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 8_000;
/// Fixed channel count (mono).
pub const CHANNELS: u16 = 1;
/// Fixed sample depth.
pub const BITS_PER_SAMPLE: u16 = 16;

/// PCM sample data delivered by an `AudioSource`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw samples (i16 PCM).
    pub samples: Vec<i16>,
    /// Milliseconds since the source started.
    pub timestamp_ms: u64,
}

/// Audio device seam. Implementations push frames until stopped or until
/// the receiver is dropped.
#[async_trait]
pub trait AudioSource: Send {
    /// Starts capture and returns the frame receiver.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stops capture.
    async fn stop(&mut self) -> Result<()>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Generates silent frames at the fixed device settings. Used by the demo
/// binary and tests where no microphone is available.
pub struct SilenceSource {
    frame_ms: u64,
    stop_tx: Option<tokio::sync::watch::Sender<bool>>,
}

impl SilenceSource {
    pub fn new() -> Self {
        Self {
            frame_ms: 100,
            stop_tx: None,
        }
    }
}

impl Default for SilenceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSource for SilenceSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        self.stop_tx = Some(stop_tx);

        let frame_ms = self.frame_ms;
        let samples_per_frame = (SAMPLE_RATE as u64 * frame_ms / 1000) as usize;

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(frame_ms));
            let mut elapsed_ms = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let frame = AudioFrame {
                            samples: vec![0i16; samples_per_frame],
                            timestamp_ms: elapsed_ms,
                        };
                        elapsed_ms += frame_ms;
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "silence"
    }
}
