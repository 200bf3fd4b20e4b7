//! Multiplexed playback session
//!
//! A `PlaybackSession` drives one or two output devices at once, each
//! through its own native-rate cpal stream. A binding that fails to set
//! up (unreadable file, vanished device, stream open refusal) is
//! recorded and the remaining bindings proceed. All surviving streams
//! start together, which gives approximate wall-clock synchrony.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use log::{debug, error, warn};

use crate::audio::device::{describe_output, resolve_output};
use crate::audio::resampler::resample;
use crate::audio::source::AudioSource;
use crate::error::{Error, Result};

/// Wrapper to keep a `cpal::Stream` alive across await points.
///
/// The stream is `!Send` on some platforms because of internal raw
/// pointers. We never touch it from another thread after creation; we
/// only hold it and eventually drop it. The audio callback runs on
/// cpal's own thread regardless.
struct SendStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendStream {}

/// One device that could not join the session
#[derive(Debug)]
pub struct BindingFailure {
    pub device: String,
    pub error: Error,
}

struct OutputBinding {
    device: String,
    _stream: SendStream,
    finished: Arc<AtomicBool>,
}

pub struct PlaybackSession {
    bindings: Vec<OutputBinding>,
    failures: Vec<BindingFailure>,
    /// Cleared by cancel; callbacks emit silence once it drops
    active: Arc<AtomicBool>,
}

impl PlaybackSession {
    /// Start playback of `pairs` of (audio file, output device name).
    ///
    /// Every stream is opened at its device's native sample rate; a
    /// source at a different rate is resampled before the stream opens.
    /// Per-pair failures land in `failures()` instead of aborting the
    /// session. Only an empty or malformed request fails outright.
    pub fn start(pairs: &[(PathBuf, String)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::Precondition(
                "nothing to play: no file/device pairs given".to_string(),
            ));
        }
        if pairs.iter().any(|(_, device)| device.trim().is_empty()) {
            return Err(Error::Precondition(
                "every playback pair needs a device name".to_string(),
            ));
        }

        let active = Arc::new(AtomicBool::new(true));
        let mut bindings = Vec::new();
        let mut failures = Vec::new();

        for (path, device_name) in pairs {
            match Self::open_binding(path, device_name, &active) {
                Ok(binding) => bindings.push(binding),
                Err(error) => {
                    warn!("Playback binding '{}' failed: {}", device_name, error);
                    failures.push(BindingFailure {
                        device: device_name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(Self {
            bindings,
            failures,
            active,
        })
    }

    fn open_binding(
        path: &PathBuf,
        device_name: &str,
        active: &Arc<AtomicBool>,
    ) -> Result<OutputBinding> {
        let source = AudioSource::open(path)?;
        let device = resolve_output(device_name)?;
        let descriptor = describe_output(&device)?;
        let native_rate = descriptor.sample_rate;

        // Prefer a config matching the source's channel count; fall back
        // to the device default and remap channels in the callback.
        let stream_channels = device
            .supported_output_configs()
            .ok()
            .and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == source.channels
                        && c.min_sample_rate() <= SampleRate(native_rate)
                        && c.max_sample_rate() >= SampleRate(native_rate)
                })
            })
            .map(|c| c.channels())
            .unwrap_or(descriptor.channels);

        let config = StreamConfig {
            channels: stream_channels,
            sample_rate: SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let source = resample(&source, native_rate)?;
        debug!(
            "Opening '{}' at {}Hz, {} stream channels ({} source channels)",
            device_name, native_rate, stream_channels, source.channels
        );

        let finished = Arc::new(AtomicBool::new(false));
        let shared_source = Arc::new(Mutex::new(source));

        let cb_source = Arc::clone(&shared_source);
        let cb_finished = Arc::clone(&finished);
        let cb_active = Arc::clone(active);
        let err_device = device_name.to_string();
        let out_channels = stream_channels as usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !cb_active.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        cb_finished.store(true, Ordering::SeqCst);
                        return;
                    }

                    let mut source = match cb_source.lock() {
                        Ok(guard) => guard,
                        Err(_) => {
                            data.fill(0.0);
                            cb_finished.store(true, Ordering::SeqCst);
                            return;
                        }
                    };

                    let src_channels = source.channels as usize;
                    let frames_wanted = data.len() / out_channels;
                    let chunk = source.read_frames(frames_wanted).to_vec();
                    let frames_got = chunk.len() / src_channels;

                    for (i, frame) in data.chunks_mut(out_channels).enumerate() {
                        if i >= frames_got {
                            frame.fill(0.0);
                            continue;
                        }
                        let src_frame = &chunk[i * src_channels..(i + 1) * src_channels];
                        write_frame(frame, src_frame);
                    }

                    if source.is_exhausted() {
                        cb_finished.store(true, Ordering::SeqCst);
                    }
                },
                move |err| error!("Playback error on '{}': {}", err_device, err),
                None,
            )
            .map_err(|e| Error::StreamCreation {
                device: device_name.to_string(),
                reason: e.to_string(),
            })?;

        stream.play().map_err(|e| Error::StreamCreation {
            device: device_name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(OutputBinding {
            device: device_name.to_string(),
            _stream: SendStream(stream),
            finished,
        })
    }

    /// Devices that failed to join the session
    pub fn failures(&self) -> &[BindingFailure] {
        &self.failures
    }

    /// Devices that are actually playing
    pub fn active_devices(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.device.as_str()).collect()
    }

    /// True once every surviving binding has drained (or was cancelled).
    /// A session with zero surviving bindings is finished immediately.
    pub fn finished(&self) -> bool {
        self.bindings
            .iter()
            .all(|b| b.finished.load(Ordering::SeqCst))
    }

    /// Poll until every binding drains
    pub async fn wait(&self) {
        while !self.finished() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop playback and release all device handles. No-op when the
    /// session already drained. Teardown is best-effort: streams are
    /// dropped and any driver-side complaint only gets logged.
    pub fn cancel(&mut self) {
        if self.bindings.is_empty() {
            return;
        }
        self.active.store(false, Ordering::SeqCst);
        debug!("Cancelling playback on {} device(s)", self.bindings.len());
        self.bindings.clear();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Map one interleaved source frame onto one output frame.
/// Mono sources are duplicated across outputs; extra source channels
/// beyond the output width are averaged into the last output slot.
fn write_frame(out: &mut [f32], src: &[f32]) {
    if src.len() == 1 {
        out.fill(src[0]);
        return;
    }
    if src.len() >= out.len() {
        let (head, tail) = src.split_at(out.len() - 1);
        for (o, s) in out.iter_mut().zip(head.iter()) {
            *o = *s;
        }
        out[head.len()] = tail.iter().sum::<f32>() / tail.len() as f32;
    } else {
        for (i, o) in out.iter_mut().enumerate() {
            *o = src[i % src.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_a_precondition_error() {
        let result = PlaybackSession::start(&[]);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn blank_device_name_is_a_precondition_error() {
        let pairs = vec![(PathBuf::from("out.wav"), "  ".to_string())];
        let result = PlaybackSession::start(&pairs);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn bad_file_is_isolated_per_binding() {
        // The file does not exist, so this binding must fail without
        // taking the session down.
        let pairs = vec![(
            PathBuf::from("/nonexistent/missing.wav"),
            "whatever device".to_string(),
        )];
        let session = PlaybackSession::start(&pairs).unwrap();
        assert_eq!(session.failures().len(), 1);
        assert!(session.finished());
    }

    #[test]
    fn mono_source_duplicates_to_stereo() {
        let mut out = [0.0f32; 2];
        write_frame(&mut out, &[0.7]);
        assert_eq!(out, [0.7, 0.7]);
    }

    #[test]
    fn wide_source_folds_into_narrow_output() {
        let mut out = [0.0f32; 2];
        write_frame(&mut out, &[0.1, 0.4, 0.8]);
        assert!((out[0] - 0.1).abs() < f32::EPSILON);
        assert!((out[1] - 0.6).abs() < 0.001);
    }

    #[test]
    fn stereo_passthrough() {
        let mut out = [0.0f32; 2];
        write_frame(&mut out, &[0.2, -0.3]);
        assert_eq!(out, [0.2, -0.3]);
    }
}
