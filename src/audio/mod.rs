//! Audio pipeline
//!
//! This module provides:
//! - Device catalog over cpal (enumeration, name resolution)
//! - WAV decoding into cursored f32 sources, with rubato resampling
//! - Multiplexed playback across one or two output devices
//! - Microphone capture at the device's native rate
//! - Session ownership and last-audio persistence

pub mod capture;
pub mod device;
pub mod playback;
pub mod resampler;
pub mod session;
pub mod source;
pub mod store;

pub use capture::RecordedAudio;
pub use session::SessionManager;
pub use store::AudioStore;
