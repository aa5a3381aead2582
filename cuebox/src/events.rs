//! Sound lifecycle notifications
//!
//! Playback components report lifecycle transitions as [`SoundEvent`]
//! values; the facade queues them and delivers each one to the matching
//! caller-supplied callback in [`SoundCallbacks`]. Events that carry a time
//! express it in seconds on the backend playback clock.

use crate::error::Error;
use std::sync::Arc;

/// Lifecycle events emitted by a sound.
#[derive(Debug, Clone)]
pub enum SoundEvent {
    /// Backing audio finished decoding; the sound is now playable
    Loaded,

    /// Fetch or decode failed; the sound is permanently not ready
    LoadFailed(Arc<Error>),

    /// Playback began sounding
    Started,

    /// Playback was stopped explicitly
    Stopped,

    /// A loop iteration was promoted; the following one is scheduled at
    /// `next_start`
    Loop { next_start: f64 },

    /// Playback is scheduled but has not reached its start time yet
    Waiting { start: f64 },

    /// A deferred start was cancelled before it began sounding
    WaitCancelled,

    /// Playback finished naturally (last pool voice decayed, or the final
    /// loop iteration completed after `end()`)
    Ended,
}

/// Boxed notification callbacks, all optional.
///
/// Callbacks run on whichever thread delivers the underlying completion
/// (the backend's notification thread, or the caller's own thread for
/// synchronous transitions such as `stop()`). They may freely call back
/// into the [`Sound`](crate::Sound) they observe.
#[derive(Default)]
pub struct SoundCallbacks {
    /// Backing audio is decoded and playable
    pub on_load: Option<Box<dyn FnMut() + Send>>,

    /// Loading failed; the sound will never become ready
    pub on_error: Option<Box<dyn FnMut(&Error) + Send>>,

    /// Playback began sounding
    pub on_play: Option<Box<dyn FnMut() + Send>>,

    /// Playback stopped explicitly
    pub on_stop: Option<Box<dyn FnMut() + Send>>,

    /// Loop handoff occurred; argument is the next scheduled start time
    pub on_loop: Option<Box<dyn FnMut(f64) + Send>>,

    /// Deferred start accepted; argument is the scheduled start time
    pub on_wait: Option<Box<dyn FnMut(f64) + Send>>,

    /// Deferred start cancelled before sounding
    pub on_wait_cancel: Option<Box<dyn FnMut() + Send>>,

    /// Playback finished naturally
    pub on_end: Option<Box<dyn FnMut() + Send>>,
}

impl std::fmt::Debug for SoundCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |o: bool| if o { "set" } else { "-" };
        f.debug_struct("SoundCallbacks")
            .field("on_load", &set(self.on_load.is_some()))
            .field("on_error", &set(self.on_error.is_some()))
            .field("on_play", &set(self.on_play.is_some()))
            .field("on_stop", &set(self.on_stop.is_some()))
            .field("on_loop", &set(self.on_loop.is_some()))
            .field("on_wait", &set(self.on_wait.is_some()))
            .field("on_wait_cancel", &set(self.on_wait_cancel.is_some()))
            .field("on_end", &set(self.on_end.is_some()))
            .finish()
    }
}
