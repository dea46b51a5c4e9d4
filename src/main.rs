use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use screenrec::encoder::FfmpegSinkFactory;
use screenrec::frame::TestPatternSource;
use screenrec::pipeline::{ScreenPipeline, TimerPipeline};
use screenrec::{
    AudioRecorder, CapturePipeline, Muxer, RecorderConfig, RecordingSession, RecordingStore,
    SilenceSource,
};

#[derive(Parser, Debug)]
#[command(name = "screenrec", about = "Record a synthetic surface to an mp4")]
struct Args {
    /// Recording length in seconds.
    #[arg(short, long, default_value_t = 5)]
    seconds: u64,

    /// Use the display-paced pipeline instead of the fixed-interval timer.
    #[arg(long)]
    screen: bool,

    /// Optional config file (TOML); defaults are used when absent.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };

    let store = RecordingStore::new(&cfg.recording.output_dir)?;
    let capture = cfg.capture_config();
    let source = Box::new(TestPatternSource::new());
    let sink_factory = Arc::new(FfmpegSinkFactory);

    let pipeline: Box<dyn CapturePipeline> = if args.screen {
        Box::new(ScreenPipeline::new(
            capture,
            store.clone(),
            source,
            sink_factory,
        ))
    } else {
        Box::new(TimerPipeline::new(
            capture,
            store.clone(),
            source,
            sink_factory,
        ))
    };

    let audio = AudioRecorder::new(store.temp_audio_path());
    let muxer = Muxer::new(store);
    let mut session =
        RecordingSession::new(pipeline, audio, Box::new(SilenceSource::new()), muxer);

    session.start().await?;
    info!("recording for {} seconds", args.seconds);
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;

    let merged = session.finish().await?;
    info!("recording saved to {}", merged.path.display());
    Ok(())
}
