// Merge and session orchestration tests.
//
// The merge backend is swapped for an in-process double; a copying backend
// stands in for a successful export, a failing one for an export error.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use screenrec::audio::{AudioRecorder, SilenceSource};
use screenrec::encoder::{EncoderConfig, SinkFactory, VideoSink};
use screenrec::error::RecordError;
use screenrec::frame::{PixelBuffer, TestPatternSource};
use screenrec::mux::{MergeBackend, Muxer};
use screenrec::pipeline::{CaptureConfig, CapturePipeline, TimerPipeline};
use screenrec::session::RecordingSession;
use screenrec::store::RecordingStore;

struct CopyMerger;

#[async_trait]
impl MergeBackend for CopyMerger {
    async fn export(&self, video: &Path, audio: &Path, output: &Path) -> anyhow::Result<()> {
        let mut merged = fs::read(video)?;
        merged.extend(fs::read(audio)?);
        fs::write(output, merged)?;
        Ok(())
    }
}

struct FailingMerger;

#[async_trait]
impl MergeBackend for FailingMerger {
    async fn export(&self, _video: &Path, _audio: &Path, _output: &Path) -> anyhow::Result<()> {
        anyhow::bail!("export session failed")
    }
}

struct NullSink;

#[async_trait]
impl VideoSink for NullSink {
    fn is_ready(&self) -> bool {
        true
    }

    async fn append(&mut self, _frame: &PixelBuffer, _pts: Duration) -> Result<bool, RecordError> {
        Ok(true)
    }

    async fn finish(&mut self) -> Result<(), RecordError> {
        Ok(())
    }
}

struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn create(
        &self,
        _config: &EncoderConfig,
        output: &Path,
        _rotation_degrees: i32,
    ) -> Result<Box<dyn VideoSink>, RecordError> {
        fs::File::create(output)?;
        Ok(Box::new(NullSink))
    }
}

struct BrokenFinishSink;

#[async_trait]
impl VideoSink for BrokenFinishSink {
    fn is_ready(&self) -> bool {
        true
    }

    async fn append(&mut self, _frame: &PixelBuffer, _pts: Duration) -> Result<bool, RecordError> {
        Ok(true)
    }

    async fn finish(&mut self) -> Result<(), RecordError> {
        Err(RecordError::Config("encoder finalize failure".into()))
    }
}

struct BrokenFinishSinkFactory;

impl SinkFactory for BrokenFinishSinkFactory {
    fn create(
        &self,
        _config: &EncoderConfig,
        output: &Path,
        _rotation_degrees: i32,
    ) -> Result<Box<dyn VideoSink>, RecordError> {
        fs::File::create(output)?;
        Ok(Box::new(BrokenFinishSink))
    }
}

fn leftover_intermediates(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|name| {
            name.starts_with("raw-") || name.starts_with("audio-") || name.starts_with("export-")
        })
        .collect()
}

#[tokio::test]
async fn merge_persists_and_deletes_intermediates() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();

    let video = store.temp_video_path();
    let audio = store.temp_audio_path();
    fs::write(&video, b"video-bytes").unwrap();
    fs::write(&audio, b"audio-bytes").unwrap();

    let muxer = Muxer::with_backend(store.clone(), Box::new(CopyMerger));
    let merged = muxer.merge(&video, &audio).await.unwrap();

    assert!(merged.path.exists());
    assert_eq!(fs::read(&merged.path).unwrap(), b"video-bytesaudio-bytes");
    assert_eq!(store.list().unwrap(), vec![merged.path]);
    assert!(leftover_intermediates(dir.path()).is_empty());
}

#[tokio::test]
async fn failed_merge_preserves_intermediates() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();

    let video = store.temp_video_path();
    let audio = store.temp_audio_path();
    fs::write(&video, b"video-bytes").unwrap();
    fs::write(&audio, b"audio-bytes").unwrap();

    let muxer = Muxer::with_backend(store.clone(), Box::new(FailingMerger));
    let result = muxer.merge(&video, &audio).await;

    assert!(matches!(result, Err(RecordError::Merge(_))));
    assert!(video.exists(), "video intermediate must survive a failed merge");
    assert!(audio.exists(), "audio intermediate must survive a failed merge");
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn merge_keeps_unequal_track_durations() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();

    // 3 seconds of video.
    let config = CaptureConfig {
        width: 16,
        height: 16,
        scale: 1,
        frame_rate: 10,
        ..CaptureConfig::default()
    };
    let mut pipeline = TimerPipeline::new(
        config,
        store.clone(),
        Box::new(TestPatternSource::new()),
        Arc::new(NullSinkFactory),
    );
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let video = pipeline.stop().await.unwrap();

    // 2.5 seconds of audio.
    let mut recorder = AudioRecorder::new(store.temp_audio_path());
    recorder.begin(Box::new(SilenceSource::new())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let audio = recorder.end().await.unwrap();

    assert!(video.duration >= Duration::from_millis(2700));
    assert!(
        audio.duration >= Duration::from_millis(2300)
            && audio.duration <= Duration::from_millis(2800),
        "audio duration was {:?}",
        audio.duration
    );

    let video_bytes = fs::read(&video.path).unwrap();
    let audio_bytes = fs::read(&audio.path).unwrap();

    let muxer = Muxer::with_backend(store.clone(), Box::new(CopyMerger));
    let merged = muxer.merge(&video.path, &audio.path).await.unwrap();

    // Neither track was trimmed on the way into the container.
    let merged_bytes = fs::read(&merged.path).unwrap();
    assert_eq!(merged_bytes.len(), video_bytes.len() + audio_bytes.len());
    assert!(!video.path.exists());
    assert!(!audio.path.exists());
}

fn session_in(store: &RecordingStore, backend: Box<dyn MergeBackend>) -> RecordingSession {
    let config = CaptureConfig {
        width: 16,
        height: 16,
        scale: 1,
        frame_rate: 10,
        ..CaptureConfig::default()
    };
    let pipeline = TimerPipeline::new(
        config,
        store.clone(),
        Box::new(TestPatternSource::new()),
        Arc::new(NullSinkFactory),
    );
    let audio = AudioRecorder::new(store.temp_audio_path());
    let muxer = Muxer::with_backend(store.clone(), backend);
    RecordingSession::new(
        Box::new(pipeline),
        audio,
        Box::new(SilenceSource::new()),
        muxer,
    )
}

#[tokio::test(start_paused = true)]
async fn session_records_and_merges_end_to_end() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();
    let mut session = session_in(&store, Box::new(CopyMerger));

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let merged = session.finish().await.unwrap();

    assert!(merged.path.exists());
    assert_eq!(store.list().unwrap(), vec![merged.path]);
    assert!(leftover_intermediates(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn video_failure_still_finalizes_the_audio_track() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();

    let config = CaptureConfig {
        width: 16,
        height: 16,
        scale: 1,
        frame_rate: 10,
        ..CaptureConfig::default()
    };
    let pipeline = TimerPipeline::new(
        config,
        store.clone(),
        Box::new(TestPatternSource::new()),
        Arc::new(BrokenFinishSinkFactory),
    );
    let audio = AudioRecorder::new(store.temp_audio_path());
    let audio_path = audio.path().clone();
    let muxer = Muxer::with_backend(store.clone(), Box::new(CopyMerger));
    let mut session = RecordingSession::new(
        Box::new(pipeline),
        audio,
        Box::new(SilenceSource::new()),
        muxer,
    );

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(session.finish().await.is_err());

    // The audio writer was wound down and its file finalized; both
    // intermediates stay on disk for diagnostics.
    let reader = hound::WavReader::open(&audio_path).unwrap();
    assert!(reader.len() > 0);
    let leftovers = leftover_intermediates(dir.path());
    assert!(leftovers.iter().any(|n| n.starts_with("raw-")));
    assert!(leftovers.iter().any(|n| n.starts_with("audio-")));
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandoned_session_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::new(dir.path()).unwrap();
    let mut session = session_in(&store, Box::new(CopyMerger));

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.abandon().await.unwrap();

    assert!(store.list().unwrap().is_empty());
    assert!(leftover_intermediates(dir.path()).is_empty());
}
