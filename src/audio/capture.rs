//! Microphone recording session
//!
//! Captures mono f32 audio at the input device's native rate. The cpal
//! callback thread is the only writer of the sample buffer; ownership
//! transfers to the caller when `stop` tears the stream down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use log::{debug, error, info};

use crate::audio::device::{describe_input, resolve_input};
use crate::error::{Error, Result};

/// A finished recording, ready to serialize or transcribe
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RecordedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Serialize to a 16-bit PCM mono WAV container in memory
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::AudioFormat {
                    path: "<memory>".to_string(),
                    reason: e.to_string(),
                })?;
            for &sample in &self.samples {
                let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                writer.write_sample(value).map_err(|e| Error::AudioFormat {
                    path: "<memory>".to_string(),
                    reason: e.to_string(),
                })?;
            }
            writer.finalize().map_err(|e| Error::AudioFormat {
                path: "<memory>".to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(cursor.into_inner())
    }
}

/// See `SendStream` in playback: held only to keep the stream alive.
struct SendStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendStream {}

pub struct RecordingSession {
    buffer: Arc<Mutex<Vec<f32>>>,
    recording: Arc<AtomicBool>,
    stream: Option<SendStream>,
    sample_rate: u32,
    device_name: String,
}

impl RecordingSession {
    /// Open the input device (system default when `device` is None) at
    /// its native rate and start appending mono-folded samples.
    pub fn start(device: Option<&str>) -> Result<Self> {
        let input = resolve_input(device)?;
        let descriptor = describe_input(&input)?;
        let device_name = descriptor.name;
        let sample_rate = descriptor.sample_rate;
        let channels = descriptor.channels as usize;

        let config = StreamConfig {
            channels: descriptor.channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let recording = Arc::new(AtomicBool::new(true));

        let cb_buffer = Arc::clone(&buffer);
        let cb_recording = Arc::clone(&recording);
        let err_device = device_name.clone();

        let stream = input
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !cb_recording.load(Ordering::SeqCst) {
                        return;
                    }
                    let mut buffer = match cb_buffer.lock() {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                    if channels == 1 {
                        buffer.extend_from_slice(data);
                    } else {
                        buffer.extend(
                            data.chunks_exact(channels)
                                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                        );
                    }
                },
                move |err| error!("Capture error on '{}': {}", err_device, err),
                None,
            )
            .map_err(|e| Error::StreamCreation {
                device: device_name.clone(),
                reason: e.to_string(),
            })?;

        stream.play().map_err(|e| Error::StreamCreation {
            device: device_name.clone(),
            reason: e.to_string(),
        })?;

        info!("Recording from '{}' at {}Hz", device_name, sample_rate);

        Ok(Self {
            buffer,
            recording,
            stream: Some(SendStream(stream)),
            sample_rate,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Stop capturing. Returns the recorded audio, or None when
    /// `discard` is set (the buffer is dropped without a look).
    pub fn stop(&mut self, discard: bool) -> Option<RecordedAudio> {
        self.recording.store(false, Ordering::SeqCst);
        self.stream.take();

        if discard {
            debug!("Recording on '{}' discarded", self.device_name);
            if let Ok(mut buffer) = self.buffer.lock() {
                buffer.clear();
            }
            return None;
        }

        let samples = match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        };
        debug!(
            "Recording on '{}' stopped with {} samples",
            self.device_name,
            samples.len()
        );
        Some(RecordedAudio {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    /// Tear down without keeping anything
    pub fn cancel(&mut self) {
        self.stop(true);
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.recording.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_bytes_round_trip() {
        let audio = RecordedAudio {
            samples: vec![0.0, 0.5, -0.5, 1.0, -1.0],
            sample_rate: 48000,
        };
        let bytes = audio.to_wav_bytes().unwrap();

        let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], 16383);
        assert_eq!(samples[3], 32767);
        assert_eq!(samples[4], -32767);
    }

    #[test]
    fn clipped_samples_stay_in_range() {
        let audio = RecordedAudio {
            samples: vec![2.0, -3.0],
            sample_rate: 16000,
        };
        let bytes = audio.to_wav_bytes().unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32767]);
    }

    #[test]
    fn duration_tracks_rate() {
        let audio = RecordedAudio {
            samples: vec![0.0; 24000],
            sample_rate: 48000,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-9);
    }

    // Needs a microphone; tolerate machines without one.
    #[test]
    fn start_stop_does_not_panic() {
        match RecordingSession::start(None) {
            Ok(mut session) => {
                assert!(session.is_recording());
                let audio = session.stop(false);
                assert!(audio.is_some());
            }
            Err(Error::DeviceUnavailable(_))
            | Err(Error::DeviceEnumeration(_))
            | Err(Error::StreamCreation { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
