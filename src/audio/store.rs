//! Persisted audio files
//!
//! The store keeps the most recent synthesized output and the most
//! recent kept recording under the config directory, so replay works
//! across restarts. Kept recordings are also archived with generated
//! names under a `recordings/` subdirectory.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use log::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::settings::config_dir;

const LAST_OUTPUT: &str = "last_output.wav";
const LAST_RECORDING: &str = "last_recording.wav";

#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    /// Open the store in the platform config directory
    pub fn open() -> Result<Self> {
        Ok(Self::at(config_dir()?))
    }

    /// Open the store at an explicit directory (tests)
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn last_output_path(&self) -> PathBuf {
        self.dir.join(LAST_OUTPUT)
    }

    pub fn last_recording_path(&self) -> PathBuf {
        self.dir.join(LAST_RECORDING)
    }

    pub fn has_last_output(&self) -> bool {
        self.last_output_path().is_file()
    }

    /// Persist synthesized WAV bytes as the replay target
    pub fn save_last_output(&self, wav_bytes: &[u8]) -> Result<PathBuf> {
        let path = self.last_output_path();
        self.write_atomic(&path, wav_bytes)?;
        debug!("Saved last output to {}", path.display());
        Ok(path)
    }

    /// Persist a kept recording and archive a timestamped copy
    pub fn save_last_recording(&self, wav_bytes: &[u8]) -> Result<PathBuf> {
        let path = self.last_recording_path();
        self.write_atomic(&path, wav_bytes)?;

        let archive = self.dir.join("recordings").join(generate_filename());
        self.write_atomic(&archive, wav_bytes)?;
        debug!("Archived recording to {}", archive.display());
        Ok(path)
    }

    /// Write via a temp file in the same directory, then rename
    fn write_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("tmp-{}", &Uuid::new_v4().to_string()[..8]));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Generate a unique recording filename with a readable timestamp
fn generate_filename() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let uuid = Uuid::new_v4().to_string();
    format!("recording_{}_{}.wav", timestamp, &uuid[..8])
}
