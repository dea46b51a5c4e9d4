// Recordings directory bookkeeping.
//
// Intermediate artifacts carry distinguishable temporary names; finished
// recordings are renamed (moved, not copied) to `<unixEpochSeconds>.mp4`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RecordError;

const RAW_PREFIX: &str = "raw-";
const AUDIO_PREFIX: &str = "audio-";
const EXPORT_PREFIX: &str = "export-";

/// Handle to the recordings directory shared by the pipeline, the audio
/// recorder, and the muxer.
#[derive(Debug, Clone)]
pub struct RecordingStore {
    dir: PathBuf,
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Temporary path for the raw video track of one session.
    pub fn temp_video_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.mp4", RAW_PREFIX, Uuid::new_v4()))
    }

    /// Temporary path for the parallel audio track.
    pub fn temp_audio_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.wav", AUDIO_PREFIX, Uuid::new_v4()))
    }

    /// Temporary path for the merge export.
    pub fn temp_export_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}.mp4", EXPORT_PREFIX, Uuid::new_v4()))
    }

    /// Moves a finished artifact into persistent storage under a
    /// timestamp-derived name and returns the final path.
    pub fn persist(&self, temp: &Path) -> Result<PathBuf, RecordError> {
        let epoch = chrono::Utc::now().timestamp();
        let mut dest = self.dir.join(format!("{}.mp4", epoch));
        let mut suffix = 1;
        while dest.exists() {
            dest = self.dir.join(format!("{}-{}.mp4", epoch, suffix));
            suffix += 1;
        }

        fs::rename(temp, &dest)?;
        info!("persisted recording: {}", dest.display());
        Ok(dest)
    }

    /// Deletes an intermediate artifact, tolerating a missing file.
    pub fn discard(&self, path: &Path) -> Result<(), RecordError> {
        if path.exists() {
            fs::remove_file(path)?;
            debug!("discarded intermediate: {}", path.display());
        }
        Ok(())
    }

    /// Enumerates finished recordings (temporary artifacts excluded),
    /// oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, RecordError> {
        let mut recordings = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if name.starts_with(RAW_PREFIX) || name.starts_with(EXPORT_PREFIX) {
                continue;
            }
            recordings.push(path);
        }
        recordings.sort();
        Ok(recordings)
    }
}
