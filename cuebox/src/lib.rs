//! # cuebox
//!
//! Low-latency playback of short audio clips: multishot sounds that may
//! overlap themselves, and gapless loops.
//!
//! **Purpose:** Hide the single-use-voice constraint of real audio
//! mixing graphs behind a simple [`Sound`] facade, with voice pooling
//! for rapid retriggering and dual-voice lookahead scheduling for
//! seamless looping.
//!
//! **Architecture:** A [`SoundEngine`] owns an [`AudioBackend`] (cpal
//! output in production, a manually-clocked mock in tests) and an async
//! fetch/decode pipeline on tokio. Each created [`Sound`] drives its
//! voices synchronously from backend completion callbacks.
//!
//! ```no_run
//! use cuebox::{CpalBackend, SoundConfig, SoundEngine, SoundSource, SoundType};
//! use std::sync::Arc;
//!
//! # fn main() -> cuebox::Result<()> {
//! let backend = Arc::new(CpalBackend::new()?);
//! let engine = SoundEngine::new(backend);
//!
//! let config = SoundConfig::new(
//!     SoundSource::File("click.wav".into()),
//!     SoundType::Multishot,
//! );
//! let sound = engine.create_sound(config)?;
//! sound.play(); // no-op until the clip finishes loading
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod playback;
pub mod sound;

pub use audio::types::DecodedAudio;
pub use backend::{
    AudioBackend, CpalBackend, EndedFn, GainStage, MockBackend, VoiceHandle, WakeHandle,
};
pub use config::{SoundConfig, SoundSource, SoundType, MAX_VOLUME};
pub use engine::{DecodeService, FetchService, SoundEngine};
pub use error::{Error, Result};
pub use events::SoundCallbacks;
pub use sound::{Sound, SoundState};
