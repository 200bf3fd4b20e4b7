//! Decoded audio with a read cursor
//!
//! An `AudioSource` holds interleaved f32 samples decoded from a WAV
//! container plus a cursor, so playback callbacks can pull fixed-size
//! chunks until exhaustion.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::{Error, Result};

/// Frames pulled per callback chunk
pub const CHUNK_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct AudioSource {
    /// Interleaved samples, `channels` per frame
    samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    cursor: usize,
}

impl AudioSource {
    /// Decode a WAV file from disk
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path).map_err(|e| Error::AudioFormat {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_reader(reader, &path.display().to_string())
    }

    /// Decode a WAV container already in memory (synthesized audio)
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| Error::AudioFormat {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })?;
        Self::from_reader(reader, "<memory>")
    }

    fn from_reader<R: std::io::Read>(mut reader: WavReader<R>, origin: &str) -> Result<Self> {
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::AudioFormat {
                    path: origin.to_string(),
                    reason: e.to_string(),
                })?,
            SampleFormat::Int => {
                let divisor = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / divisor))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::AudioFormat {
                        path: origin.to_string(),
                        reason: e.to_string(),
                    })?
            }
        };

        if spec.channels == 0 {
            return Err(Error::AudioFormat {
                path: origin.to_string(),
                reason: "zero channels".to_string(),
            });
        }

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            cursor: 0,
        })
    }

    /// Build a source directly from interleaved samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            cursor: 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Total frames in the source
    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn remaining_frames(&self) -> usize {
        (self.samples.len() - self.cursor) / self.channels as usize
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Pull up to `CHUNK_FRAMES` interleaved frames and advance the cursor.
    /// Returns an empty slice once exhausted.
    pub fn read_chunk(&mut self) -> &[f32] {
        self.read_frames(CHUNK_FRAMES)
    }

    /// Pull up to `frames` interleaved frames and advance the cursor
    pub fn read_frames(&mut self, frames: usize) -> &[f32] {
        let want = frames * self.channels as usize;
        let end = (self.cursor + want).min(self.samples.len());
        let chunk = &self.samples[self.cursor..end];
        self.cursor = end;
        chunk
    }
}
