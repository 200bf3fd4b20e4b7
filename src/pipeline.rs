//! Speech pipeline orchestrator
//!
//! Drives the whole flow as a small state machine: typed text goes
//! Synthesizing then Playing; captured speech goes Recording,
//! Transcribing, optionally Editing, then (when speaking back)
//! Synthesizing and Playing. `cancel` returns the machine to Idle from
//! any state, aborting pending remote calls and live audio sessions.
//!
//! Cancellation is a level-triggered flag paired with a `Notify` wakeup:
//! the flag is what cancels, the `Notify` only interrupts pending awaits.
//! Every operation clears the flag when it starts and checks it after
//! each await, so a cancel landing between awaits is never lost.
//!
//! Locking order is always state before sessions, and no lock is held
//! across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use tokio::sync::Notify;

use crate::audio::session::SETTLE_DELAY;
use crate::audio::{AudioStore, RecordedAudio, SessionManager};
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::speech::{RewriteService, SynthesisService, TranscriptionService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Recording,
    Transcribing,
    Editing,
    Synthesizing,
    Playing,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Recording => "recording",
            PipelineState::Transcribing => "transcribing",
            PipelineState::Editing => "editing",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// How an operation ended when it didn't fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

pub struct Pipeline {
    state: Mutex<PipelineState>,
    cancelled: AtomicBool,
    cancel: Notify,
    sessions: Mutex<SessionManager>,
    synthesis: Arc<dyn SynthesisService>,
    transcription: Arc<dyn TranscriptionService>,
    rewrite: Arc<dyn RewriteService>,
    store: AudioStore,
    settings: Settings,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        store: AudioStore,
        synthesis: Arc<dyn SynthesisService>,
        transcription: Arc<dyn TranscriptionService>,
        rewrite: Arc<dyn RewriteService>,
    ) -> Self {
        Self {
            state: Mutex::new(PipelineState::Idle),
            cancelled: AtomicBool::new(false),
            cancel: Notify::new(),
            sessions: Mutex::new(SessionManager::new()),
            synthesis,
            transcription,
            rewrite,
            store,
            settings,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: PipelineState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, SessionManager> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Abort whatever is in flight and return to Idle. Safe to call from
    /// any state; a no-op when Idle.
    pub fn cancel(&self) {
        let was = self.state();
        if was != PipelineState::Idle {
            info!("Cancelling {} operation", was);
        }
        // The flag stays set until the next operation begins, so a
        // cancel landing between two awaits is still observed.
        self.cancelled.store(true, Ordering::SeqCst);
        self.set_state(PipelineState::Idle);
        self.sessions().cancel_all();
        self.cancel.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Idle is fine; a drained Playing session is displaced; anything
    /// else requires an explicit cancel first. Clears any stale cancel
    /// flag, since a new operation is beginning.
    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            PipelineState::Idle => {
                self.cancelled.store(false, Ordering::SeqCst);
                Ok(())
            }
            PipelineState::Playing => {
                self.sessions().cancel_all();
                self.set_state(PipelineState::Idle);
                self.cancelled.store(false, Ordering::SeqCst);
                Ok(())
            }
            busy => Err(Error::Precondition(format!(
                "pipeline is busy ({}); cancel the current operation first",
                busy
            ))),
        }
    }

    /// Speak typed text through the configured output devices
    pub async fn speak(&self, text: &str) -> Result<Outcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Precondition("nothing to speak: empty text".to_string()));
        }
        // Raised before any network call
        let targets = self.settings.playback_targets()?;
        self.ensure_ready()?;

        self.set_state(PipelineState::Synthesizing);
        let wav = tokio::select! {
            result = self.synthesis.synthesize(
                text,
                &self.settings.voice,
                self.settings.tone.as_deref(),
            ) => match result {
                Ok(wav) => wav,
                Err(e) => {
                    self.set_state(PipelineState::Idle);
                    return Err(e);
                }
            },
            _ = self.cancel.notified() => {
                self.set_state(PipelineState::Idle);
                return Ok(Outcome::Cancelled);
            }
        };

        // A cancel may have landed while synthesis was resolving
        if self.is_cancelled() {
            self.set_state(PipelineState::Idle);
            return Ok(Outcome::Cancelled);
        }

        let path = match self.store.save_last_output(&wav) {
            Ok(path) => path,
            Err(e) => {
                self.set_state(PipelineState::Idle);
                return Err(e);
            }
        };

        self.play_file(&path, &targets).await
    }

    /// Replay the last synthesized or spoken-back audio
    pub async fn replay_last(&self) -> Result<Outcome> {
        let targets = self.settings.playback_targets()?;
        if !self.store.has_last_output() {
            return Err(Error::Precondition(
                "nothing to replay: no audio has been spoken yet".to_string(),
            ));
        }
        self.ensure_ready()?;
        self.play_file(&self.store.last_output_path(), &targets).await
    }

    /// Start capturing from the configured input device
    pub async fn start_recording(&self) -> Result<()> {
        self.ensure_ready()?;

        let displaced = self.sessions().cancel_all();
        if displaced {
            tokio::time::sleep(SETTLE_DELAY).await;
        }
        // A cancel during the settle delay leaves the pipeline idle
        // instead of opening the microphone
        if self.is_cancelled() {
            return Ok(());
        }
        self.sessions()
            .start_recording(self.settings.input_device.as_deref())?;
        self.set_state(PipelineState::Recording);
        Ok(())
    }

    /// Stop capturing. With `discard` the audio is dropped untranscribed;
    /// otherwise it is transcribed (exactly once), optionally rewritten,
    /// and optionally spoken back. Returns the final transcript, or None
    /// when discarded or cancelled midway.
    pub async fn stop_recording(&self, discard: bool, speak_back: bool) -> Result<Option<String>> {
        if self.state() != PipelineState::Recording {
            return Err(Error::Precondition("no recording in progress".to_string()));
        }
        self.cancelled.store(false, Ordering::SeqCst);

        let audio = self.sessions().stop_recording(discard);
        let Some(audio) = audio else {
            self.set_state(PipelineState::Idle);
            return Ok(None);
        };

        if audio.is_empty() {
            self.set_state(PipelineState::Idle);
            return Err(Error::Precondition(
                "recording captured no audio".to_string(),
            ));
        }

        info!("Recording stopped after {:.1}s", audio.duration_secs());
        self.process_recording(audio, speak_back).await
    }

    /// Transcribe a kept recording, then rewrite/speak per settings
    async fn process_recording(
        &self,
        audio: RecordedAudio,
        speak_back: bool,
    ) -> Result<Option<String>> {
        let wav = match audio.to_wav_bytes() {
            Ok(wav) => wav,
            Err(e) => {
                self.set_state(PipelineState::Idle);
                return Err(e);
            }
        };
        if let Err(e) = self.store.save_last_recording(&wav) {
            self.set_state(PipelineState::Idle);
            return Err(e);
        }

        self.set_state(PipelineState::Transcribing);
        let transcript = tokio::select! {
            result = self.transcription.transcribe(&wav) => match result {
                Ok(text) => text,
                Err(e) => {
                    self.set_state(PipelineState::Idle);
                    return Err(e);
                }
            },
            _ = self.cancel.notified() => {
                self.set_state(PipelineState::Idle);
                return Ok(None);
            }
        };
        if self.is_cancelled() {
            self.set_state(PipelineState::Idle);
            return Ok(None);
        }

        let text = if self.settings.rewrite.enabled && self.settings.rewrite.auto_apply_to_recording
        {
            self.set_state(PipelineState::Editing);
            tokio::select! {
                result = self.rewrite.rewrite(&transcript) => match result {
                    Ok(text) => text,
                    Err(e) => {
                        self.set_state(PipelineState::Idle);
                        return Err(e);
                    }
                },
                _ = self.cancel.notified() => {
                    self.set_state(PipelineState::Idle);
                    return Ok(None);
                }
            }
        } else {
            transcript
        };

        self.set_state(PipelineState::Idle);
        if self.is_cancelled() {
            return Ok(None);
        }
        if speak_back {
            self.speak(&text).await?;
        }
        Ok(Some(text))
    }

    /// Rewrite arbitrary text with the configured style rules
    pub async fn rewrite_text(&self, text: &str) -> Result<Option<String>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Precondition("nothing to rewrite: empty text".to_string()));
        }
        self.ensure_ready()?;

        self.set_state(PipelineState::Editing);
        let result = tokio::select! {
            result = self.rewrite.rewrite(text) => result.map(Some),
            _ = self.cancel.notified() => Ok(None),
        };
        self.set_state(PipelineState::Idle);
        if self.is_cancelled() {
            return Ok(None);
        }
        result
    }

    /// Play one file to every target device and wait for it to drain
    async fn play_file(&self, path: &std::path::Path, targets: &[String]) -> Result<Outcome> {
        let pairs: Vec<_> = targets
            .iter()
            .map(|device| (path.to_path_buf(), device.clone()))
            .collect();

        let displaced = self.sessions().cancel_all();
        if displaced {
            tokio::time::sleep(SETTLE_DELAY).await;
        }

        // Checked before any stream opens: a cancel that landed after
        // synthesis (or during the settle delay) must not start playback
        if self.is_cancelled() {
            self.set_state(PipelineState::Idle);
            return Ok(Outcome::Cancelled);
        }

        {
            let mut sessions = self.sessions();
            if let Err(e) = sessions.start_playback(&pairs) {
                self.set_state(PipelineState::Idle);
                return Err(e);
            }
            if let Some(playback) = sessions.playback() {
                for failure in playback.failures() {
                    warn!("Output '{}' dropped: {}", failure.device, failure.error);
                }
                if playback.active_devices().is_empty() && !playback.failures().is_empty() {
                    let devices: Vec<_> =
                        playback.failures().iter().map(|f| f.device.clone()).collect();
                    sessions.clear_playback();
                    self.set_state(PipelineState::Idle);
                    return Err(Error::StreamCreation {
                        device: devices.join(", "),
                        reason: "playback failed on every device".to_string(),
                    });
                }
            }
        }

        self.set_state(PipelineState::Playing);
        loop {
            tokio::select! {
                _ = self.cancel.notified() => {
                    self.sessions().cancel_all();
                    self.set_state(PipelineState::Idle);
                    return Ok(Outcome::Cancelled);
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {
                    if self.is_cancelled() {
                        self.sessions().cancel_all();
                        self.set_state(PipelineState::Idle);
                        return Ok(Outcome::Cancelled);
                    }
                    if self.sessions().playback_finished() {
                        break;
                    }
                }
            }
        }

        self.sessions().clear_playback();
        self.set_state(PipelineState::Idle);
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct MockSynthesis {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SynthesisService for MockSynthesis {
        async fn synthesize(&self, _: &str, _: &str, _: Option<&str>) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(b"RIFFfake".to_vec())
        }
    }

    struct MockTranscription {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranscriptionService for MockTranscription {
        async fn transcribe(&self, _: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("raw transcript".to_string())
        }
    }

    struct MockRewrite {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RewriteService for MockRewrite {
        async fn rewrite(&self, _: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("polished transcript".to_string())
        }
    }

    struct Fixture {
        pipeline: Arc<Pipeline>,
        synthesis: Arc<MockSynthesis>,
        transcription: Arc<MockTranscription>,
        rewrite: Arc<MockRewrite>,
        _dir: TempDir,
    }

    fn fixture(mut settings: Settings, synth_delay: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        if settings.primary_device.is_none() {
            settings.primary_device = Some("Test Speakers".to_string());
        }
        let synthesis = Arc::new(MockSynthesis {
            calls: AtomicUsize::new(0),
            delay: synth_delay,
        });
        let transcription = Arc::new(MockTranscription {
            calls: AtomicUsize::new(0),
        });
        let rewrite = Arc::new(MockRewrite {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(Pipeline::new(
            settings,
            AudioStore::at(dir.path().to_path_buf()),
            synthesis.clone(),
            transcription.clone(),
            rewrite.clone(),
        ));
        Fixture {
            pipeline,
            synthesis,
            transcription,
            rewrite,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn empty_text_short_circuits_before_synthesis() {
        let f = fixture(Settings::default(), Duration::ZERO);
        let result = f.pipeline.speak("   ").await;
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(f.synthesis.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn missing_primary_device_short_circuits_before_synthesis() {
        let dir = TempDir::new().unwrap();
        let synthesis = Arc::new(MockSynthesis {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let pipeline = Pipeline::new(
            Settings::default(),
            AudioStore::at(dir.path().to_path_buf()),
            synthesis.clone(),
            Arc::new(MockTranscription {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(MockRewrite {
                calls: AtomicUsize::new(0),
            }),
        );
        let result = pipeline.speak("hello").await;
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(synthesis.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_during_synthesis_returns_to_idle() {
        let f = fixture(Settings::default(), Duration::from_secs(30));
        let pipeline = f.pipeline.clone();
        let task = tokio::spawn(async move { pipeline.speak("hello there").await });

        // Let the speak call reach the synthesis await
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.pipeline.state(), PipelineState::Synthesizing);

        f.pipeline.cancel();
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, Outcome::Cancelled);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
        // Nothing was persisted for replay
        assert!(!f.pipeline.store.has_last_output());
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_noop() {
        let f = fixture(Settings::default(), Duration::ZERO);
        f.pipeline.cancel();
        f.pipeline.cancel();
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }

    // A cancel that lands after synthesis resolves but before any stream
    // opens must stop the operation; without the level check the request
    // would proceed into playback.
    #[tokio::test]
    async fn cancel_between_synthesis_and_playback_is_honored() {
        let f = fixture(Settings::default(), Duration::ZERO);
        f.pipeline.cancel();

        let targets = vec!["Test Speakers".to_string()];
        let result = f
            .pipeline
            .play_file(std::path::Path::new("out.wav"), &targets)
            .await
            .unwrap();
        assert_eq!(result, Outcome::Cancelled);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn stale_cancel_does_not_poison_the_next_operation() {
        let f = fixture(Settings::default(), Duration::ZERO);
        f.pipeline.cancel();

        // The new request must reach synthesis; playback then fails on
        // the fake device, which is fine for this check
        let _ = f.pipeline.speak("hello again").await;
        assert_eq!(f.synthesis.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn stop_without_recording_is_a_precondition_error() {
        let f = fixture(Settings::default(), Duration::ZERO);
        let result = f.pipeline.stop_recording(false, false).await;
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(f.transcription.calls.load(Ordering::SeqCst), 0);
    }

    // Hardware-tolerant: only exercises the discard path when a
    // microphone is actually present.
    #[tokio::test]
    async fn discarded_recording_never_reaches_transcription() {
        let f = fixture(Settings::default(), Duration::ZERO);
        if f.pipeline.start_recording().await.is_err() {
            return;
        }
        let result = f.pipeline.stop_recording(true, false).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.transcription.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn kept_recording_transcribes_exactly_once() {
        let f = fixture(Settings::default(), Duration::ZERO);
        let audio = RecordedAudio {
            samples: vec![0.1; 1600],
            sample_rate: 16000,
        };
        let result = f.pipeline.process_recording(audio, false).await.unwrap();
        assert_eq!(result.as_deref(), Some("raw transcript"));
        assert_eq!(f.transcription.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.rewrite.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
        // Kept recordings are persisted
        assert!(f.pipeline.store.last_recording_path().is_file());
    }

    #[tokio::test]
    async fn auto_rewrite_applies_to_kept_recordings() {
        let mut settings = Settings::default();
        settings.rewrite.enabled = true;
        settings.rewrite.auto_apply_to_recording = true;
        let f = fixture(settings, Duration::ZERO);

        let audio = RecordedAudio {
            samples: vec![0.1; 1600],
            sample_rate: 16000,
        };
        let result = f.pipeline.process_recording(audio, false).await.unwrap();
        assert_eq!(result.as_deref(), Some("polished transcript"));
        assert_eq!(f.rewrite.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rewrite_disabled_leaves_transcript_untouched() {
        let mut settings = Settings::default();
        settings.rewrite.enabled = true; // but no auto-apply
        let f = fixture(settings, Duration::ZERO);

        let audio = RecordedAudio {
            samples: vec![0.1; 1600],
            sample_rate: 16000,
        };
        let result = f.pipeline.process_recording(audio, false).await.unwrap();
        assert_eq!(result.as_deref(), Some("raw transcript"));
        assert_eq!(f.rewrite.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replay_without_prior_output_is_a_precondition_error() {
        let f = fixture(Settings::default(), Duration::ZERO);
        let result = f.pipeline.replay_last().await;
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[tokio::test]
    async fn rewrite_text_round_trips_through_editing() {
        let f = fixture(Settings::default(), Duration::ZERO);
        let result = f.pipeline.rewrite_text("fix me up").await.unwrap();
        assert_eq!(result.as_deref(), Some("polished transcript"));
        assert_eq!(f.pipeline.state(), PipelineState::Idle);
    }
}
