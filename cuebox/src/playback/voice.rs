//! Single-use playback voice wrapper
//!
//! A backend voice can never be restarted once it has played, so the core
//! treats voices as disposable: create, start at most once, replace. This
//! wrapper adds the bookkeeping the pool and loop scheduler need on top of
//! the raw backend handle: a busy flag, a started guard (some platforms
//! reject stopping a voice that never started), and the armed flag used to
//! distinguish "stopped by us" from "finished naturally".

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, GainStage, VoiceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared notifier invoked (with the voice id) when a voice finishes
/// naturally. Built once per sound; holds only a weak reference back to
/// the sound so orphaned voices self-clean without keeping it alive.
pub(crate) type EndedNotifier = Arc<dyn Fn(u64) + Send + Sync>;

pub(crate) struct Voice {
    id: u64,
    handle: Box<dyn VoiceHandle>,
    /// While true, the completion notification is forwarded; cleared
    /// before any stop the core issues itself.
    armed: Arc<AtomicBool>,
    busy: bool,
    started: bool,
}

impl Voice {
    /// Create a fresh idle voice wired to forward its natural completion
    /// through `notifier`.
    pub(crate) fn new(
        id: u64,
        backend: &dyn AudioBackend,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        notifier: EndedNotifier,
    ) -> Self {
        let armed = Arc::new(AtomicBool::new(true));
        let armed_in_callback = Arc::clone(&armed);
        let handle = backend.create_voice(
            buffer,
            gain,
            rate,
            Box::new(move || {
                if armed_in_callback.load(Ordering::SeqCst) {
                    notifier(id);
                }
            }),
        );
        Self {
            id,
            handle,
            armed,
            busy: false,
            started: false,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    /// Start playback at `at_time` on the backend clock and mark busy.
    pub(crate) fn start_at(&mut self, at_time: f64) {
        debug_assert!(!self.started, "single-use voice started twice");
        self.handle.start(at_time);
        self.started = true;
        self.busy = true;
    }

    /// Mark no longer busy after a natural completion. The voice itself is
    /// spent and must be replaced before this slot can fire again.
    pub(crate) fn mark_ended(&mut self) {
        self.busy = false;
    }

    /// Suppress the completion notification without touching playback.
    /// A detached voice keeps sounding until it decays naturally.
    fn detach(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Silence the voice: detach first so the stop-triggered completion is
    /// never mistaken for a natural end, then stop if it ever started.
    pub(crate) fn silence(&mut self) {
        self.detach();
        if self.started {
            self.handle.stop();
        }
        self.busy = false;
    }

    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.handle.set_rate(rate);
    }
}
