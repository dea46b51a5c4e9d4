// Fixed-interval capture with a single render lock.
//
// The timer is never torn down while recording: pausing only flips a flag
// under the status mutex, and every tick that lands during a pause
// accumulates one frame interval of spaced time so resume is instantaneous
// and the pause window is excised from presentation timestamps. A tick that
// arrives while the previous frame is still being written is skipped.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{CaptureConfig, CapturePipeline, PipelineState, RecordingArtifact};
use crate::encoder::{EncoderConfig, FrameEncoder, SinkFactory};
use crate::error::RecordError;
use crate::frame::{FrameSource, PixelBufferPool};
use crate::store::RecordingStore;

#[derive(Default)]
struct Status {
    paused: bool,
    writing: bool,
    /// Accumulated pause time, subtracted from every timestamp.
    spaced: Duration,
    started: Option<Instant>,
}

struct Shared {
    status: StdMutex<Status>,
    encoder: TokioMutex<FrameEncoder>,
}

/// Timer-mode capture pipeline: fixed-interval clock, mutex-guarded state.
pub struct TimerPipeline {
    config: CaptureConfig,
    store: RecordingStore,
    sink_factory: Arc<dyn SinkFactory>,
    source: Option<Box<dyn FrameSource>>,
    shared: Option<Arc<Shared>>,
    clock: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    state: PipelineState,
}

impl TimerPipeline {
    pub fn new(
        config: CaptureConfig,
        store: RecordingStore,
        source: Box<dyn FrameSource>,
        sink_factory: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            config,
            store,
            sink_factory,
            source: Some(source),
            shared: None,
            clock: None,
            shutdown_tx: None,
            state: PipelineState::Idle,
        }
    }

    async fn run_clock(
        shared: Arc<Shared>,
        mut source: Box<dyn FrameSource>,
        pool: PixelBufferPool,
        mut shutdown_rx: watch::Receiver<bool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::draw_frame(&shared, &mut source, &pool, interval).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One timer tick. Pause and write-in-progress checks are atomic with
    /// respect to `pause`/`resume`, which lock the same mutex.
    async fn draw_frame(
        shared: &Shared,
        source: &mut Box<dyn FrameSource>,
        pool: &PixelBufferPool,
        interval: Duration,
    ) {
        {
            let mut status = shared.status.lock().unwrap();
            if status.paused {
                status.spaced += interval;
                return;
            }
            if status.writing {
                debug!("previous frame still writing, tick skipped");
                return;
            }
            status.writing = true;
        }

        let mut buffer = match pool.acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("frame dropped: {}", e);
                shared.status.lock().unwrap().writing = false;
                return;
            }
        };

        if let Err(e) = source.render(&mut buffer) {
            warn!("surface render failed, frame dropped: {}", e);
            shared.status.lock().unwrap().writing = false;
            return;
        }

        let pts = {
            let mut status = shared.status.lock().unwrap();
            let now = Instant::now();
            let started = *status.started.get_or_insert(now);
            (now - started).saturating_sub(status.spaced)
        };

        {
            let mut encoder = shared.encoder.lock().await;
            match encoder.append(&buffer, pts).await {
                Ok(()) => {}
                Err(RecordError::EncoderRejected) => {
                    debug!("encoder not ready at {:?}, frame dropped", pts)
                }
                Err(e) => warn!("append failed: {}", e),
            }
        }

        drop(buffer);
        shared.status.lock().unwrap().writing = false;
    }

    /// Cancels the timer synchronously and waits for the tick task, so no
    /// frame write is in progress afterwards.
    async fn shut_down_clock(&mut self) -> Arc<Shared> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(clock) = self.clock.take() {
            let _ = clock.await;
        }
        self.shared.take().expect("shared state present while recording")
    }
}

#[async_trait]
impl CapturePipeline for TimerPipeline {
    async fn start(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Idle {
            return Err(RecordError::AlreadyRecording);
        }
        self.state = PipelineState::Configuring;

        let source = self.source.take().ok_or_else(|| {
            RecordError::Config("frame source already consumed".into())
        })?;

        let encoder_config = EncoderConfig::for_resolution(
            self.config.output_width(),
            self.config.output_height(),
            self.config.effective_frame_rate(),
        );
        let output_path = self.store.temp_video_path();

        let setup: Result<(PixelBufferPool, FrameEncoder), RecordError> = (|| {
            let pool = PixelBufferPool::new(
                self.config.output_width(),
                self.config.output_height(),
                self.config.pool_capacity,
            )?;
            let sink = self.sink_factory.create(&encoder_config, &output_path, 0)?;
            let encoder = FrameEncoder::configure(&encoder_config, sink, output_path)?;
            Ok((pool, encoder))
        })();

        let (pool, encoder) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e);
            }
        };

        let shared = Arc::new(Shared {
            status: StdMutex::new(Status::default()),
            encoder: TokioMutex::new(encoder),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let clock = tokio::spawn(Self::run_clock(
            Arc::clone(&shared),
            source,
            pool,
            shutdown_rx,
            self.config.frame_interval(),
        ));

        self.shared = Some(shared);
        self.clock = Some(clock);
        self.shutdown_tx = Some(shutdown_tx);
        self.state = PipelineState::Recording;
        info!(
            "timer capture started: {}x{} @ {} fps",
            self.config.output_width(),
            self.config.output_height(),
            self.config.effective_frame_rate()
        );
        Ok(())
    }

    fn pause(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Recording {
            return Err(RecordError::NotRecording);
        }
        if let Some(shared) = &self.shared {
            shared.status.lock().unwrap().paused = true;
        }
        self.state = PipelineState::Paused;
        info!("timer capture paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Paused {
            return Err(RecordError::NotRecording);
        }
        if let Some(shared) = &self.shared {
            shared.status.lock().unwrap().paused = false;
        }
        self.state = PipelineState::Recording;
        info!("timer capture resumed");
        Ok(())
    }

    async fn stop(&mut self) -> Result<RecordingArtifact, RecordError> {
        if self.state != PipelineState::Recording && self.state != PipelineState::Paused {
            return Err(RecordError::NotRecording);
        }
        let shared = self.shut_down_clock().await;
        self.state = PipelineState::Finishing;

        let mut encoder = shared.encoder.lock().await;
        match encoder.finish().await {
            Ok(_) => {
                let duration = encoder.last_pts().unwrap_or_default();
                let frames_appended = encoder.frames_appended();
                let temp_path = encoder.output_path().to_path_buf();
                drop(encoder);

                let path = self.store.persist(&temp_path)?;
                self.state = PipelineState::Completed;
                info!(
                    "recording completed: {:?} ({} frames) -> {}",
                    duration,
                    frames_appended,
                    path.display()
                );
                Ok(RecordingArtifact {
                    path,
                    duration,
                    frames_appended,
                })
            }
            Err(e) => {
                // Temp artifact left in place for diagnostics; no move.
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Recording && self.state != PipelineState::Paused {
            return Err(RecordError::NotRecording);
        }
        let shared = self.shut_down_clock().await;
        self.state = PipelineState::Finishing;

        let mut encoder = shared.encoder.lock().await;
        if let Err(e) = encoder.finish().await {
            warn!("encoder finalize during close failed: {}", e);
        }
        let temp_path = encoder.output_path().to_path_buf();
        drop(encoder);

        self.store.discard(&temp_path)?;
        self.state = PipelineState::Closed;
        info!("recording closed, artifact discarded");
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }
}
