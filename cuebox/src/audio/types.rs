//! Core audio data types

use crate::error::{Error, Result};
use std::sync::Arc;

/// Decoded PCM audio, ready for playback.
///
/// Immutable after construction; shareable read-only across any number of
/// voices via `Arc<DecodedAudio>`. Samples are interleaved stereo f32
/// `[L, R, L, R, ...]` in the [-1.0, 1.0] range.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo f32 samples
    samples: Vec<f32>,

    /// Sample rate of the decoded audio
    sample_rate: u32,
}

impl DecodedAudio {
    /// Create from interleaved stereo samples.
    ///
    /// # Errors
    /// Rejects an odd sample count (not whole stereo frames) or a zero
    /// sample rate.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.len() % 2 != 0 {
            return Err(Error::Decode(format!(
                "Interleaved stereo sample count must be even, got {}",
                samples.len()
            )));
        }
        if sample_rate == 0 {
            return Err(Error::Decode("Sample rate must be non-zero".to_string()));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a silent buffer of the given duration in seconds.
    pub fn silence(duration: f64, sample_rate: u32) -> Result<Self> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::Decode(format!("Invalid duration: {}", duration)));
        }
        let frames = (duration * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * 2], sample_rate)
    }

    /// Interleaved stereo samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Duration in seconds at the native sample rate
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Convenience wrapper for the shareable form used by voices
    pub fn into_shared(self) -> Arc<DecodedAudio> {
        Arc::new(self)
    }
}
