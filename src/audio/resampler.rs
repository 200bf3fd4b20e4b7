//! Sample rate conversion using rubato
//!
//! Playback streams run at each device's native rate, so a source whose
//! rate differs is converted in one synchronous pass before the stream
//! opens. Empty or same-rate sources pass through untouched.

use log::debug;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

use crate::audio::source::AudioSource;
use crate::error::{Error, Result};

/// Convert a source to `target_rate`, returning a new source.
///
/// Same-rate input is returned as-is with its cursor reset by the
/// rebuild. Runs on the calling thread; done before any stream opens.
pub fn resample(source: &AudioSource, target_rate: u32) -> Result<AudioSource> {
    if source.sample_rate == target_rate || source.samples().is_empty() {
        return Ok(AudioSource::from_samples(
            source.samples().to_vec(),
            target_rate,
            source.channels,
        ));
    }

    debug!(
        "Resampling {} frames from {}Hz to {}Hz ({} channels)",
        source.total_frames(),
        source.sample_rate,
        target_rate,
        source.channels
    );

    let planar_input = deinterleave(source.samples(), source.channels);
    let input_frames = planar_input[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        target_rate as f64 / source.sample_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        source.channels as usize,
    )
    .map_err(|e| Error::AudioFormat {
        path: "<resampler>".to_string(),
        reason: e.to_string(),
    })?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::AudioFormat {
            path: "<resampler>".to_string(),
            reason: format!("resampling failed: {}", e),
        })?;

    let interleaved = interleave(planar_output);
    Ok(AudioSource::from_samples(
        interleaved,
        target_rate,
        source.channels,
    ))
}

/// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let num_channels = channels as usize;
    let num_frames = samples.len() / num_channels;

    let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            planar[ch_idx].push(samples[frame_idx * num_channels + ch_idx]);
        }
    }
    planar
}

/// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }
    let num_channels = planar.len();
    let num_frames = planar[0].len();

    let mut interleaved = Vec::with_capacity(num_frames * num_channels);
    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            interleaved.push(planar[ch_idx][frame_idx]);
        }
    }
    interleaved
}
