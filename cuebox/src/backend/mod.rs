//! Platform mixing graph abstraction
//!
//! The playback core only needs a handful of primitives from the host
//! platform: a monotonic playback clock, single-use voices bound to a
//! buffer, gain stages feeding the output destination, and end-of-playback
//! notifications. The exact graph topology behind those primitives is a
//! backend implementation detail.
//!
//! Two backends ship with the crate:
//! - [`CpalBackend`]: real-time output through the default audio device
//! - [`MockBackend`]: manually-advanced clock for tests and offline use

use crate::audio::types::DecodedAudio;
use std::sync::Arc;

pub mod mock;
pub mod output;

pub use mock::MockBackend;
pub use output::CpalBackend;

/// Completion notification for a voice.
///
/// Fires exactly once: naturally at end-of-buffer, or immediately when the
/// voice is explicitly stopped. Callers that need to tell the two apart
/// suppress the notification before stopping (see `playback::Voice`).
pub type EndedFn = Box<dyn FnOnce() + Send>;

/// A gain stage in the platform mixing graph, feeding the destination.
///
/// Gains are linear amplitude multipliers; perceptual volume curving is the
/// caller's concern.
pub trait GainStage: Send + Sync {
    fn set_gain(&self, gain: f64);
    fn gain(&self) -> f64;
}

/// Handle to one single-use playback voice.
///
/// A voice can be started at most once and never restarted; replaying a
/// sound always means creating a new voice. This is a platform constraint
/// the playback core is designed around, not a defect.
pub trait VoiceHandle: Send {
    /// Schedule playback at `at_time` on the backend clock.
    ///
    /// A time in the past starts the voice immediately. Calling `start`
    /// more than once is a caller contract violation.
    fn start(&mut self, at_time: f64);

    /// Stop the voice (idempotent; a scheduled-but-not-yet-sounding voice
    /// is cancelled without ever becoming audible).
    ///
    /// Triggers the completion notification if it has not fired yet.
    fn stop(&mut self);

    /// Update the playback rate of a live voice.
    fn set_rate(&mut self, rate: f64);
}

/// Cancellation handle for a scheduled wake.
pub trait WakeHandle: Send {
    fn cancel(&mut self);
}

/// The platform audio backend.
///
/// Implementations must deliver completion notifications and wakes without
/// holding internal locks across the call, so that the notified code can
/// freely create and schedule new voices from within the callback.
pub trait AudioBackend: Send + Sync {
    /// Current time on the playback clock, in seconds.
    fn now(&self) -> f64;

    /// Create a gain stage feeding the output destination.
    fn create_gain(&self) -> Arc<dyn GainStage>;

    /// Create a single-use voice bound to `buffer`, routed through `gain`.
    ///
    /// The voice is idle until started; creating voices ahead of time is
    /// cheap and is how callers hide allocation latency.
    fn create_voice(
        &self,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        on_ended: EndedFn,
    ) -> Box<dyn VoiceHandle>;

    /// Schedule `wake` to run at `at_time` on the playback clock.
    ///
    /// Wakes are advisory (caller notification only); they are never the
    /// mechanism producing actual audio timing.
    fn schedule_wake(&self, at_time: f64, wake: Box<dyn FnOnce() + Send>) -> Box<dyn WakeHandle>;
}
