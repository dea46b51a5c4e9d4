use anyhow::Result;
use serde::Deserialize;

use crate::audio::source::{CHANNELS, SAMPLE_RATE};
use crate::pipeline::{CaptureConfig, DEFAULT_FRAME_RATE};

#[derive(Debug, Deserialize)]
pub struct RecorderConfig {
    pub recording: RecordingConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    pub frame_rate: u32,
    pub output_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig {
                width: 375,
                height: 667,
                scale: 2,
                frame_rate: DEFAULT_FRAME_RATE,
                output_dir: "recordings".to_string(),
            },
            audio: AudioConfig {
                sample_rate: SAMPLE_RATE,
                channels: CHANNELS,
            },
        }
    }
}

impl RecorderConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    // The audio format is fixed crate-wide; the config section exists so a
    // mismatched file fails loudly instead of being silently ignored.
    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != SAMPLE_RATE || self.audio.channels != CHANNELS {
            anyhow::bail!(
                "audio format is fixed at {} Hz / {} channel(s), config asks for {} Hz / {}",
                SAMPLE_RATE,
                CHANNELS,
                self.audio.sample_rate,
                self.audio.channels
            );
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.recording.width,
            height: self.recording.height,
            scale: self.recording.scale,
            frame_rate: self.recording.frame_rate,
            ..CaptureConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, audio_section: &str) -> String {
        let body = format!(
            r#"
[recording]
width = 375
height = 667
scale = 2
frame_rate = 12
output_dir = "recordings"

{}
"#,
            audio_section
        );
        let path = dir.path().join("recorder.toml");
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn load_accepts_the_fixed_audio_format() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[audio]\nsample_rate = 8000\nchannels = 1");

        let cfg = RecorderConfig::load(&path).unwrap();
        assert_eq!(cfg.recording.frame_rate, 12);
        assert_eq!(cfg.capture_config().frame_rate, 12);
    }

    #[test]
    fn load_rejects_other_audio_formats() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[audio]\nsample_rate = 44100\nchannels = 2");

        let err = RecorderConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("fixed at 8000 Hz"));
    }
}
