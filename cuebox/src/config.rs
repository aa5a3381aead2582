//! Sound configuration
//!
//! One explicit configuration struct with documented defaults per field,
//! validated once at sound creation.

use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use crate::events::SoundCallbacks;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Maximum value of the caller-facing volume scale.
pub const MAX_VOLUME: f64 = 100.0;

/// Where a sound's audio bytes come from.
#[derive(Debug, Clone)]
pub enum SoundSource {
    /// Fetched over HTTP(S)
    Url(String),

    /// Read from the local filesystem
    File(PathBuf),

    /// Already decoded; the sound is ready immediately
    Buffer(Arc<DecodedAudio>),
}

/// Playback mode of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    /// Overlapping one-shot playback through a rotating voice pool
    Multishot,

    /// Gapless looping through dual-voice handoff
    Loop,
}

impl std::fmt::Display for SoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundType::Multishot => write!(f, "multishot"),
            SoundType::Loop => write!(f, "loop"),
        }
    }
}

/// Configuration for one sound.
///
/// Defaults: `concurrency` 1 (pool of 2 with the spare), `volume` 100
/// (full), `playback_rate` 1.0, no callbacks.
#[derive(Debug)]
pub struct SoundConfig {
    pub source: SoundSource,
    pub sound_type: SoundType,

    /// Requested concurrent plays for multishot sounds; ignored by loops
    pub concurrency: usize,

    /// Caller-facing volume on the 0..=100 scale
    pub volume: f64,

    /// Playback rate multiplier, finite and > 0
    pub playback_rate: f64,

    pub callbacks: SoundCallbacks,
}

impl SoundConfig {
    pub fn new(source: SoundSource, sound_type: SoundType) -> Self {
        Self {
            source,
            sound_type,
            concurrency: 1,
            volume: MAX_VOLUME,
            playback_rate: 1.0,
            callbacks: SoundCallbacks::default(),
        }
    }

    /// Validate once at construction; any failure is fatal to this sound
    /// only.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            SoundSource::Url(url) if url.trim().is_empty() => {
                return Err(Error::Config("Sound source URL is empty".to_string()));
            }
            SoundSource::File(path) if path.as_os_str().is_empty() => {
                return Err(Error::Config("Sound source path is empty".to_string()));
            }
            SoundSource::Buffer(buffer) if buffer.frames() == 0 => {
                return Err(Error::Config("Sound source buffer is empty".to_string()));
            }
            _ => {}
        }
        if self.concurrency < 1 {
            return Err(Error::Config(format!(
                "Concurrency must be at least 1, got {}",
                self.concurrency
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::Config(format!("Invalid volume: {}", self.volume)));
        }
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(Error::Config(format!(
                "Invalid playback rate: {}",
                self.playback_rate
            )));
        }
        Ok(())
    }
}

/// Map a caller-facing volume (0..=100) to a linear amplitude gain.
///
/// The linear fraction is squared before use: equal volume steps then land
/// closer to equal loudness steps, which is what listeners expect from a
/// volume control. 0 -> 0.0, 50 -> 0.25, 100 -> 1.0; out-of-range input
/// clamps first.
pub(crate) fn volume_to_gain(volume: f64) -> f64 {
    let fraction = volume.clamp(0.0, MAX_VOLUME) / MAX_VOLUME;
    fraction * fraction
}
