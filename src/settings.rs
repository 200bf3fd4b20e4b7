//! Application settings persistence
//!
//! Settings live in `settings.json` under the platform config directory.
//! Missing keys fall back to defaults via serde, so files written by
//! older versions keep loading.

use std::fs;
use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directory name under the platform config dir
pub const APP_DIR: &str = "mouthpiece";

/// Rewrite (AI copy editing) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Master switch for the rewrite step
    pub enabled: bool,
    /// Chat model used for rewriting
    pub model: String,
    /// Style rules sent as the system prompt
    pub prompt: String,
    /// Apply the rewrite automatically to recorded transcripts
    pub auto_apply_to_recording: bool,
    pub max_tokens: u32,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".to_string(),
            prompt: String::new(),
            auto_apply_to_recording: false,
            max_tokens: 750,
        }
    }
}

/// Hotkey combos, stored as plain key lists.
///
/// The pipeline never interprets these; they are configuration passed
/// through to whatever front end registers the hotkeys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub record_start_stop: Vec<String>,
    pub stop_recording: Vec<String>,
    pub play_last_audio: Vec<String>,
    pub cancel_operation: Vec<String>,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        let combo = |k: &str| vec!["ctrl".to_string(), "shift".to_string(), k.to_string()];
        Self {
            record_start_stop: combo("0"),
            stop_recording: combo("9"),
            play_last_audio: combo("8"),
            cancel_operation: combo("1"),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Synthesis voice name
    pub voice: String,
    /// Synthesis model
    pub tts_model: String,
    /// Tone instructions sent with synthesis requests ("cheerful", etc.)
    pub tone: Option<String>,
    /// Transcription model
    pub transcription_model: String,
    /// Input device name; None selects the system default
    pub input_device: Option<String>,
    /// Primary playback device name; required before any speak request
    pub primary_device: Option<String>,
    /// Optional second playback device (typically a virtual mic cable)
    pub secondary_device: Option<String>,
    pub rewrite: RewriteSettings,
    pub hotkeys: HotkeySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: "fable".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            tone: None,
            transcription_model: "whisper-1".to_string(),
            input_device: None,
            primary_device: None,
            secondary_device: None,
            rewrite: RewriteSettings::default(),
            hotkeys: HotkeySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, creating defaults on first run
    pub fn load() -> Result<Self> {
        let path = settings_path()?;
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::Settings(format!("could not parse {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                if let Err(e) = settings.save() {
                    warn!("Could not write default settings: {}", e);
                }
                Ok(settings)
            }
            Err(e) => Err(Error::Settings(format!(
                "could not read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<()> {
        let path = settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Settings(format!("could not serialize settings: {}", e)))?;
        fs::write(&path, contents)?;
        Ok(())
    }

    /// Output targets in binding order: primary first, then secondary
    pub fn playback_targets(&self) -> Result<Vec<String>> {
        let primary = self
            .primary_device
            .clone()
            .ok_or_else(|| Error::Precondition("select a primary playback device".to_string()))?;
        let mut targets = vec![primary];
        if let Some(secondary) = &self.secondary_device {
            targets.push(secondary.clone());
        }
        Ok(targets)
    }
}

/// Config directory for settings and last-audio files
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::Settings("no config directory on this platform".to_string()))?;
    Ok(base.join(APP_DIR))
}

fn settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

/// Resolve the API key for the remote speech services.
///
/// Environment takes precedence; otherwise a plain `api_key` file in the
/// config directory is used.
pub fn api_key() -> Result<String> {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }
    let path = config_dir()?.join("api_key");
    match fs::read_to_string(&path) {
        Ok(contents) if !contents.trim().is_empty() => Ok(contents.trim().to_string()),
        _ => Err(Error::Precondition(
            "no API key found: set OPENAI_API_KEY or write it to the api_key config file"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let settings: Settings = serde_json::from_str(r#"{"voice": "onyx"}"#).unwrap();
        assert_eq!(settings.voice, "onyx");
        assert_eq!(settings.rewrite.max_tokens, 750);
        assert_eq!(
            settings.hotkeys.record_start_stop,
            vec!["ctrl", "shift", "0"]
        );
    }

    #[test]
    fn playback_targets_require_primary() {
        let mut settings = Settings::default();
        assert!(settings.playback_targets().is_err());

        settings.primary_device = Some("Speakers".to_string());
        assert_eq!(settings.playback_targets().unwrap(), vec!["Speakers"]);

        settings.secondary_device = Some("Cable Input".to_string());
        assert_eq!(
            settings.playback_targets().unwrap(),
            vec!["Speakers", "Cable Input"]
        );
    }

    #[test]
    fn settings_round_trip() {
        let mut settings = Settings::default();
        settings.tone = Some("like a bedtime story".to_string());
        settings.rewrite.enabled = true;

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tone.as_deref(), Some("like a bedtime story"));
        assert!(back.rewrite.enabled);
    }
}
