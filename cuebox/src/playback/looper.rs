//! Dual-voice handoff scheduling for gapless loops
//!
//! A single voice cannot loop seamlessly: by the time its completion
//! notification arrives, the event loop has already let a gap through.
//! Instead, two voices are always in flight: one sounding now, one
//! pre-scheduled to start the instant the first ends. On every natural
//! completion the lookahead voice is promoted and a new lookahead is
//! scheduled one iteration further out, extending an infinite chain of
//! paired voices.
//!
//! `next_start` always accumulates from scheduled times, never from
//! wall-clock measurement, so timer jitter cannot drift the chain.

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, GainStage, WakeHandle};
use crate::events::SoundEvent;
use crate::playback::voice::{EndedNotifier, Voice};
use std::sync::Arc;
use tracing::debug;

/// Where the loop is in its lifecycle. `breaking` is tracked separately:
/// a graceful `end()` leaves the phase at `Playing` while the final
/// iteration rings out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopPhase {
    Idle,
    /// Scheduled, start time not yet reached
    Waiting,
    Playing,
}

/// Notifier invoked when a deferred start's advisory wake fires.
pub(crate) type WakeNotifier = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct LoopScheduler {
    backend: Arc<dyn AudioBackend>,
    buffer: Arc<DecodedAudio>,
    gain: Arc<dyn GainStage>,
    rate: f64,
    ended_notifier: EndedNotifier,
    wake_notifier: WakeNotifier,
    phase: LoopPhase,
    breaking: bool,
    current: Option<Voice>,
    next: Option<Voice>,
    next_start: f64,
    wake: Option<Box<dyn WakeHandle>>,
    next_voice_id: u64,
}

impl LoopScheduler {
    pub(crate) fn new(
        backend: Arc<dyn AudioBackend>,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        ended_notifier: EndedNotifier,
        wake_notifier: WakeNotifier,
    ) -> Self {
        Self {
            backend,
            buffer,
            gain,
            rate,
            ended_notifier,
            wake_notifier,
            phase: LoopPhase::Idle,
            breaking: false,
            current: None,
            next: None,
            next_start: 0.0,
            wake: None,
            next_voice_id: 0,
        }
    }

    fn fresh_voice(&mut self) -> Voice {
        let id = self.next_voice_id;
        self.next_voice_id += 1;
        Voice::new(
            id,
            self.backend.as_ref(),
            Arc::clone(&self.buffer),
            Arc::clone(&self.gain),
            self.rate,
            Arc::clone(&self.ended_notifier),
        )
    }

    /// One iteration's length on the playback clock, at the rate in effect
    /// when the iteration is scheduled.
    fn iteration_len(&self) -> f64 {
        self.buffer.duration() / self.rate
    }

    /// Begin looping at `max(at, now)`. Both the first voice and its
    /// continuation are scheduled up front, so the handoff never depends
    /// on notification latency. No-op unless idle.
    pub(crate) fn play(&mut self, at: Option<f64>) -> Option<SoundEvent> {
        if self.phase != LoopPhase::Idle {
            debug!(phase = ?self.phase, "loop play ignored: not idle");
            return None;
        }

        let now = self.backend.now();
        let start = at.unwrap_or(now).max(now);
        self.next_start = start + self.iteration_len();
        self.breaking = false;

        let mut current = self.fresh_voice();
        current.start_at(start);
        self.current = Some(current);

        let mut next = self.fresh_voice();
        next.start_at(self.next_start);
        self.next = Some(next);

        if start > now {
            // The wake only reports "now playing" to the caller; the audio
            // itself is already scheduled above.
            let notifier = Arc::clone(&self.wake_notifier);
            self.wake = Some(
                self.backend
                    .schedule_wake(start, Box::new(move || notifier())),
            );
            self.phase = LoopPhase::Waiting;
            Some(SoundEvent::Waiting { start })
        } else {
            self.phase = LoopPhase::Playing;
            Some(SoundEvent::Started)
        }
    }

    /// The advisory wake for a deferred start fired.
    pub(crate) fn wake_elapsed(&mut self) -> Option<SoundEvent> {
        if self.phase != LoopPhase::Waiting {
            return None;
        }
        self.wake = None;
        self.phase = LoopPhase::Playing;
        Some(SoundEvent::Started)
    }

    /// Natural completion of a voice. Only the currently-sounding voice
    /// drives continuation; anything else (a long-retired voice) is
    /// ignored.
    pub(crate) fn voice_ended(&mut self, id: u64) -> Option<SoundEvent> {
        if self.current.as_ref().map(Voice::id) != Some(id) {
            debug!(voice_id = id, "loop completion from non-current voice ignored");
            return None;
        }

        if self.breaking {
            // The final iteration rang out after end(); tear down.
            self.breaking = false;
            self.phase = LoopPhase::Idle;
            self.current = None;
            self.next = None;
            self.next_start = 0.0;
            self.wake = None;
            return Some(SoundEvent::Ended);
        }

        // Promote the lookahead and schedule the following iteration.
        self.current = self.next.take();
        self.next_start += self.iteration_len();
        let mut next = self.fresh_voice();
        next.start_at(self.next_start);
        self.next = Some(next);
        Some(SoundEvent::Loop {
            next_start: self.next_start,
        })
    }

    /// Graceful stop: cancel the lookahead so no further iteration begins,
    /// but let the sounding voice finish naturally. The terminal event
    /// fires later, from that voice's natural completion.
    pub(crate) fn end(&mut self) {
        if self.phase == LoopPhase::Idle || self.breaking {
            debug!("loop end ignored: nothing to break");
            return;
        }
        self.breaking = true;
        if let Some(mut next) = self.next.take() {
            next.silence();
        }
    }

    /// Hard stop: silence both voices and reset to idle synchronously.
    /// From the waiting sub-state this cancels the pending wake instead
    /// and reports the cancellation.
    pub(crate) fn stop(&mut self) -> Option<SoundEvent> {
        match self.phase {
            LoopPhase::Idle => {
                debug!("loop stop ignored: idle");
                None
            }
            LoopPhase::Waiting => {
                if let Some(mut wake) = self.wake.take() {
                    wake.cancel();
                }
                self.teardown();
                Some(SoundEvent::WaitCancelled)
            }
            LoopPhase::Playing => {
                self.teardown();
                Some(SoundEvent::Stopped)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.silence();
        }
        if let Some(mut next) = self.next.take() {
            next.silence();
        }
        self.phase = LoopPhase::Idle;
        self.breaking = false;
        self.next_start = 0.0;
        self.wake = None;
    }

    /// Apply a new rate to both in-flight voices. Already-scheduled
    /// handoff times are unchanged; the new rate shapes iterations
    /// scheduled from here on.
    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        if let Some(voice) = self.current.as_mut() {
            voice.set_rate(rate);
        }
        if let Some(voice) = self.next.as_mut() {
            voice.set_rate(rate);
        }
    }

    pub(crate) fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub(crate) fn is_breaking(&self) -> bool {
        self.breaking
    }

    /// Scheduled start of the next iteration, while looping.
    pub(crate) fn next_start(&self) -> Option<f64> {
        match self.phase {
            LoopPhase::Idle => None,
            _ => Some(self.next_start),
        }
    }
}
