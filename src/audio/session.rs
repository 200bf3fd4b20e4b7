//! Session ownership
//!
//! `SessionManager` holds at most one playback session and one recording
//! session. Starting a new session of either kind first cancels whatever
//! is live. Callers that just cancelled something should give drivers a
//! short settle delay before reopening devices; the manager itself never
//! blocks or awaits, so it can sit behind a plain mutex.

use std::path::PathBuf;
use std::time::Duration;

use log::debug;

use crate::audio::capture::{RecordedAudio, RecordingSession};
use crate::audio::playback::PlaybackSession;
use crate::error::Result;

/// Suggested delay between tearing down an old session and opening
/// devices again
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct SessionManager {
    playback: Option<PlaybackSession>,
    recording: Option<RecordingSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playback, displacing any live session of either kind
    pub fn start_playback(&mut self, pairs: &[(PathBuf, String)]) -> Result<()> {
        self.cancel_all();
        let session = PlaybackSession::start(pairs)?;
        self.playback = Some(session);
        Ok(())
    }

    /// Start recording, displacing any live session of either kind
    pub fn start_recording(&mut self, device: Option<&str>) -> Result<()> {
        self.cancel_all();
        let session = RecordingSession::start(device)?;
        self.recording = Some(session);
        Ok(())
    }

    /// Stop the live recording, returning its audio unless discarded
    pub fn stop_recording(&mut self, discard: bool) -> Option<RecordedAudio> {
        self.recording.take().and_then(|mut s| s.stop(discard))
    }

    pub fn is_recording(&self) -> bool {
        self.recording.as_ref().is_some_and(|s| s.is_recording())
    }

    pub fn playback(&self) -> Option<&PlaybackSession> {
        self.playback.as_ref()
    }

    /// True when no playback is live or the live one has drained
    pub fn playback_finished(&self) -> bool {
        self.playback.as_ref().is_none_or(|s| s.finished())
    }

    /// Drop a drained playback session
    pub fn clear_playback(&mut self) {
        self.playback = None;
    }

    pub fn is_busy(&self) -> bool {
        self.recording.is_some() || !self.playback_finished()
    }

    /// Cancel whatever is live. Returns true when something was cancelled.
    pub fn cancel_all(&mut self) -> bool {
        let mut cancelled = false;
        if let Some(mut playback) = self.playback.take() {
            playback.cancel();
            cancelled = true;
        }
        if let Some(mut recording) = self.recording.take() {
            recording.cancel();
            cancelled = true;
        }
        if cancelled {
            debug!("Cancelled live audio session(s)");
        }
        cancelled
    }
}
