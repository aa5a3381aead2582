//! Manual-clock backend for tests and offline use
//!
//! `MockBackend` implements the full [`AudioBackend`] contract against a
//! clock that only moves when [`MockBackend::advance`] is called. Due voice
//! completions and wakes fire in chronological order during `advance`, with
//! the internal lock released around every callback so the notified code
//! can create and schedule new voices mid-advance (which is exactly what
//! the loop scheduler does).
//!
//! The backend never discards voice records, so tests can assert on the
//! complete creation/start/stop history of a scenario.

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, EndedFn, GainStage, VoiceHandle, WakeHandle};
use std::sync::{Arc, Mutex};

/// Gain stage backed by a plain mutex-guarded value.
struct MockGain {
    value: Mutex<f64>,
}

impl GainStage for MockGain {
    fn set_gain(&self, gain: f64) {
        *self.value.lock().unwrap() = gain;
    }

    fn gain(&self) -> f64 {
        *self.value.lock().unwrap()
    }
}

struct MockVoiceState {
    buffer: Arc<DecodedAudio>,
    gain: Arc<dyn GainStage>,
    rate: f64,
    started_at: Option<f64>,
    stopped: bool,
    ended: bool,
    on_ended: Option<EndedFn>,
}

impl MockVoiceState {
    /// Natural end time on the mock clock, if this voice will ever end
    /// on its own.
    fn end_time(&self) -> Option<f64> {
        if self.stopped || self.ended {
            return None;
        }
        self.started_at
            .map(|start| start + self.buffer.duration() / self.rate)
    }
}

struct MockWakeState {
    at: f64,
    cancelled: bool,
    fired: bool,
    wake: Option<Box<dyn FnOnce() + Send>>,
}

#[derive(Default)]
struct MockState {
    now: f64,
    voices: Vec<MockVoiceState>,
    wakes: Vec<MockWakeState>,
}

/// Observable record of one voice's lifetime, for test assertions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockVoiceInfo {
    pub started_at: Option<f64>,
    pub stopped: bool,
    pub ended: bool,
    pub rate: f64,
    pub gain: f64,
}

/// Audio backend with a manually-advanced clock.
#[derive(Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `dt` seconds, firing every due voice
    /// completion and wake in chronological order.
    pub fn advance(&self, dt: f64) {
        assert!(dt >= 0.0, "cannot advance the clock backwards");
        let target = self.state.lock().unwrap().now + dt;

        loop {
            // Find the earliest due callback, mark it delivered, and pull
            // it out while holding the lock; invoke it after releasing so
            // the callback can reach back into the backend.
            let callback: Option<Box<dyn FnOnce() + Send>> = {
                let mut state = self.state.lock().unwrap();

                let mut best: Option<(f64, usize, bool)> = None; // (time, index, is_wake)
                for (idx, voice) in state.voices.iter().enumerate() {
                    if let Some(end) = voice.end_time() {
                        if end <= target && best.map_or(true, |(t, _, _)| end < t) {
                            best = Some((end, idx, false));
                        }
                    }
                }
                for (idx, wake) in state.wakes.iter().enumerate() {
                    if !wake.cancelled && !wake.fired && wake.at <= target {
                        if best.map_or(true, |(t, _, _)| wake.at < t) {
                            best = Some((wake.at, idx, true));
                        }
                    }
                }

                match best {
                    Some((time, idx, true)) => {
                        state.now = state.now.max(time);
                        let wake = &mut state.wakes[idx];
                        wake.fired = true;
                        wake.wake.take()
                    }
                    Some((time, idx, false)) => {
                        state.now = state.now.max(time);
                        let voice = &mut state.voices[idx];
                        voice.ended = true;
                        voice.on_ended.take()
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match callback {
                Some(f) => f(),
                None => break,
            }
        }
    }

    /// Total number of voices ever created.
    pub fn voices_created(&self) -> usize {
        self.state.lock().unwrap().voices.len()
    }

    /// Voices currently audible: started, start time reached, not yet
    /// ended or stopped.
    pub fn sounding_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .voices
            .iter()
            .filter(|v| {
                !v.stopped && !v.ended && v.started_at.map_or(false, |start| start <= state.now)
            })
            .count()
    }

    /// Voices scheduled to start in the future.
    pub fn scheduled_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .voices
            .iter()
            .filter(|v| !v.stopped && v.started_at.map_or(false, |start| start > state.now))
            .count()
    }

    /// Voices that are still usable (created but neither stopped nor ended).
    pub fn live_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .voices
            .iter()
            .filter(|v| !v.stopped && !v.ended)
            .count()
    }

    /// Full per-voice history in creation order.
    pub fn snapshot(&self) -> Vec<MockVoiceInfo> {
        let state = self.state.lock().unwrap();
        state
            .voices
            .iter()
            .map(|v| MockVoiceInfo {
                started_at: v.started_at,
                stopped: v.stopped,
                ended: v.ended,
                rate: v.rate,
                gain: v.gain.gain(),
            })
            .collect()
    }
}

impl AudioBackend for MockBackend {
    fn now(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn create_gain(&self) -> Arc<dyn GainStage> {
        Arc::new(MockGain {
            value: Mutex::new(1.0),
        })
    }

    fn create_voice(
        &self,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        on_ended: EndedFn,
    ) -> Box<dyn VoiceHandle> {
        let mut state = self.state.lock().unwrap();
        state.voices.push(MockVoiceState {
            buffer,
            gain,
            rate,
            started_at: None,
            stopped: false,
            ended: false,
            on_ended: Some(on_ended),
        });
        Box::new(MockVoice {
            state: Arc::clone(&self.state),
            index: state.voices.len() - 1,
        })
    }

    fn schedule_wake(&self, at_time: f64, wake: Box<dyn FnOnce() + Send>) -> Box<dyn WakeHandle> {
        let mut state = self.state.lock().unwrap();
        state.wakes.push(MockWakeState {
            at: at_time,
            cancelled: false,
            fired: false,
            wake: Some(wake),
        });
        Box::new(MockWake {
            state: Arc::clone(&self.state),
            index: state.wakes.len() - 1,
        })
    }
}

struct MockVoice {
    state: Arc<Mutex<MockState>>,
    index: usize,
}

impl VoiceHandle for MockVoice {
    fn start(&mut self, at_time: f64) {
        let mut state = self.state.lock().unwrap();
        let now = state.now;
        let voice = &mut state.voices[self.index];
        debug_assert!(voice.started_at.is_none(), "voice started twice");
        // A start time in the past clamps to now.
        voice.started_at = Some(at_time.max(now));
    }

    fn stop(&mut self) {
        // The platform fires the completion notification even on a
        // deliberate stop; callers suppress it beforehand if they need to
        // tell the two apart. Fired outside the lock.
        let callback = {
            let mut state = self.state.lock().unwrap();
            let voice = &mut state.voices[self.index];
            if voice.stopped || voice.ended {
                return;
            }
            voice.stopped = true;
            voice.on_ended.take()
        };
        if let Some(f) = callback {
            f();
        }
    }

    fn set_rate(&mut self, rate: f64) {
        let mut state = self.state.lock().unwrap();
        state.voices[self.index].rate = rate;
    }
}

struct MockWake {
    state: Arc<Mutex<MockState>>,
    index: usize,
}

impl WakeHandle for MockWake {
    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.wakes[self.index].cancelled = true;
    }
}
