// Display-paced capture with double-buffered backpressure.
//
// Each clock tick spawns a render pass gated by a binary render semaphore;
// the rendered buffer is handed to a single-slot append stage gated by a
// second binary semaphore. The renderer may produce frame n+1 while frame n
// is still appending, but never runs two renders or two appends at once. A
// busy render stage skips the tick; a busy append stage drops the buffer
// back into the pool. Finalize is serialized behind both gates so in-flight
// appends drain before the encoder is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as TokioMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{CaptureConfig, CapturePipeline, PipelineState, RecordingArtifact};
use crate::encoder::{EncoderConfig, FrameEncoder, SinkFactory};
use crate::error::RecordError;
use crate::frame::{FrameSource, PixelBufferPool};
use crate::store::RecordingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockCommand {
    Run,
    Pause,
    Stop,
}

#[derive(Default)]
struct Timing {
    first_tick: Option<Instant>,
    paused_total: Duration,
    pause_started: Option<Instant>,
}

struct Shared {
    render_gate: Arc<Semaphore>,
    append_gate: Arc<Semaphore>,
    encoder: TokioMutex<FrameEncoder>,
    source: TokioMutex<Box<dyn FrameSource>>,
    pool: PixelBufferPool,
    timing: StdMutex<Timing>,
    frames_dropped: AtomicU64,
}

/// Screen-mode capture pipeline: display-refresh pacing, two-stage gating.
pub struct ScreenPipeline {
    config: CaptureConfig,
    store: RecordingStore,
    sink_factory: Arc<dyn SinkFactory>,
    source: Option<Box<dyn FrameSource>>,
    shared: Option<Arc<Shared>>,
    clock: Option<JoinHandle<()>>,
    cmd_tx: Option<watch::Sender<ClockCommand>>,
    state: PipelineState,
}

impl ScreenPipeline {
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
            cmd_tx: None,
            state: PipelineState::Idle,
        }
    }

    /// Frames dropped by gate backpressure so far.
    pub fn frames_dropped(&self) -> u64 {
        self.shared
            .as_ref()
            .map(|s| s.frames_dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    async fn run_clock(
        shared: Arc<Shared>,
        mut cmd_rx: watch::Receiver<ClockCommand>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let cmd = *cmd_rx.borrow();
            match cmd {
                ClockCommand::Stop => break,
                ClockCommand::Pause => {
                    if cmd_rx.changed().await.is_err() {
                        break;
                    }
                    ticker.reset();
                }
                ClockCommand::Run => {
                    tokio::select! {
                        _ = ticker.tick() => Self::tick(&shared),
                        changed = cmd_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// One clock tick: run the render stage unless a render is in flight.
    fn tick(shared: &Arc<Shared>) {
        let render_permit = match shared.render_gate.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                // Previous frame still rendering; skip rather than block.
                shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("render stage busy, tick skipped");
                return;
            }
        };

        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let _render_permit = render_permit;

            let mut buffer = match shared.pool.acquire() {
                Ok(buffer) => buffer,
                Err(e) => {
                    shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("frame dropped: {}", e);
                    return;
                }
            };

            {
                let mut source = shared.source.lock().await;
                if let Err(e) = source.render(&mut buffer) {
                    shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("surface render failed, frame dropped: {}", e);
                    return;
                }
            }

            let pts = {
                let mut timing = shared.timing.lock().unwrap();
                // Checked under the same lock pause() takes: a frame still
                // rendering when the pause lands is dropped, not appended.
                if timing.pause_started.is_some() {
                    shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("pause during render, frame dropped");
                    return;
                }
                let now = Instant::now();
                let first = *timing.first_tick.get_or_insert(now);
                (now - first).saturating_sub(timing.paused_total)
            };

            // Hand off to the append stage; if the previous append is still
            // running, drop this buffer to keep memory bounded.
            match shared.append_gate.clone().try_acquire_owned() {
                Ok(append_permit) => {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        let _append_permit = append_permit;
                        let mut encoder = shared.encoder.lock().await;
                        match encoder.append(&buffer, pts).await {
                            Ok(()) => {}
                            Err(RecordError::EncoderRejected) => {
                                shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                debug!("encoder not ready at {:?}, frame dropped", pts);
                            }
                            Err(e) => warn!("append failed: {}", e),
                        }
                        // Buffer drops here, returning to the pool.
                    });
                }
                Err(_) => {
                    shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("append stage busy, frame dropped at {:?}", pts);
                }
            }
        });
    }

    /// Stops the clock synchronously, then drains both stages so the encoder
    /// sees no appends after finalize begins.
    async fn shut_down_clock(&mut self) -> Arc<Shared> {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let _ = cmd_tx.send(ClockCommand::Stop);
        }
        if let Some(clock) = self.clock.take() {
            let _ = clock.await;
        }
        self.shared.take().expect("shared state present while recording")
    }

    async fn finalize(shared: &Shared) -> Result<(Duration, u64), RecordError> {
        // Mirror the append-queue serialization: finalize waits for the
        // in-flight render and append to drain before closing the writer.
        let _render = shared.render_gate.acquire().await;
        let _append = shared.append_gate.acquire().await;

        let mut encoder = shared.encoder.lock().await;
        encoder.finish().await?;
        let duration = encoder.last_pts().unwrap_or_default();
        Ok((duration, encoder.frames_appended()))
    }
}

#[async_trait]
impl CapturePipeline for ScreenPipeline {
    async fn start(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Idle {
            return Err(RecordError::AlreadyRecording);
        }
        self.state = PipelineState::Configuring;

        let source = self.source.take().ok_or_else(|| {
            RecordError::Config("frame source already consumed".into())
        })?;
        let rotation = source.orientation().rotation_degrees();

        let encoder_config = EncoderConfig::for_resolution(
            self.config.output_width(),
            self.config.output_height(),
            self.config.effective_frame_rate(),
        );
        let output_path = self.store.temp_video_path();

        let result: Result<Arc<Shared>, RecordError> = (|| {
            let pool = PixelBufferPool::new(
                self.config.output_width(),
                self.config.output_height(),
                self.config.pool_capacity,
            )?;
            let sink = self
                .sink_factory
                .create(&encoder_config, &output_path, rotation)?;
            let encoder = FrameEncoder::configure(&encoder_config, sink, output_path)?;
            Ok(Arc::new(Shared {
                render_gate: Arc::new(Semaphore::new(1)),
                append_gate: Arc::new(Semaphore::new(1)),
                encoder: TokioMutex::new(encoder),
                source: TokioMutex::new(source),
                pool,
                timing: StdMutex::new(Timing::default()),
                frames_dropped: AtomicU64::new(0),
            }))
        })();

        let shared = match result {
            Ok(shared) => shared,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e);
            }
        };

        let (cmd_tx, cmd_rx) = watch::channel(ClockCommand::Run);
        let clock = tokio::spawn(Self::run_clock(
            Arc::clone(&shared),
            cmd_rx,
            self.config.frame_interval(),
        ));

        self.shared = Some(shared);
        self.clock = Some(clock);
        self.cmd_tx = Some(cmd_tx);
        self.state = PipelineState::Recording;
        info!(
            "screen capture started: {}x{} @ {} fps",
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
        if let (Some(cmd_tx), Some(shared)) = (&self.cmd_tx, &self.shared) {
            shared.timing.lock().unwrap().pause_started = Some(Instant::now());
            let _ = cmd_tx.send(ClockCommand::Pause);
        }
        self.state = PipelineState::Paused;
        info!("screen capture paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), RecordError> {
        if self.state != PipelineState::Paused {
            return Err(RecordError::NotRecording);
        }
        if let (Some(cmd_tx), Some(shared)) = (&self.cmd_tx, &self.shared) {
            {
                let mut timing = shared.timing.lock().unwrap();
                if let Some(started) = timing.pause_started.take() {
                    timing.paused_total += started.elapsed();
                }
            }
            let _ = cmd_tx.send(ClockCommand::Run);
        }
        self.state = PipelineState::Recording;
        info!("screen capture resumed");
        Ok(())
    }

    async fn stop(&mut self) -> Result<RecordingArtifact, RecordError> {
        if self.state != PipelineState::Recording && self.state != PipelineState::Paused {
            return Err(RecordError::NotRecording);
        }
        let shared = self.shut_down_clock().await;
        self.state = PipelineState::Finishing;

        match Self::finalize(&shared).await {
            Ok((duration, frames_appended)) => {
                let temp_path = shared.encoder.lock().await.output_path().to_path_buf();
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

        if let Err(e) = Self::finalize(&shared).await {
            warn!("encoder finalize during close failed: {}", e);
        }
        let temp_path = shared.encoder.lock().await.output_path().to_path_buf();
        self.store.discard(&temp_path)?;
        self.state = PipelineState::Closed;
        info!("recording closed, artifact discarded");
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }
}
