//! Rotating voice pool for overlapping one-shot playback
//!
//! Every replay of a sound needs a brand-new voice, and building one at
//! play time puts allocation latency in the hot path. The pool keeps
//! `concurrency + 1` voices alive and rotates through them: the slot at
//! `current` is always ready to fire, and after every trigger the slot one
//! ahead is refreshed so the next trigger finds a warm, idle voice waiting
//! at the position it will rotate into.

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, GainStage};
use crate::playback::voice::{EndedNotifier, Voice};
use std::mem;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct VoicePool {
    backend: Arc<dyn AudioBackend>,
    buffer: Arc<DecodedAudio>,
    gain: Arc<dyn GainStage>,
    rate: f64,
    notifier: EndedNotifier,
    voices: Vec<Voice>,
    /// Voices rotated out of their slot while still sounding. They ring
    /// out here, pruned when their natural completion arrives, and stay
    /// reachable so `stop` can silence them.
    retired: Vec<Voice>,
    current: usize,
    playing: bool,
    next_voice_id: u64,
}

impl VoicePool {
    /// Build a pool of `concurrency + 1` pre-warmed idle voices.
    ///
    /// The extra slot is the spare that lets a rapid replay proceed
    /// without interrupting the voice that is still sounding, so a
    /// requested concurrency of 1 gives an effective pool of 2.
    pub(crate) fn new(
        backend: Arc<dyn AudioBackend>,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        concurrency: usize,
        notifier: EndedNotifier,
    ) -> Self {
        let size = concurrency + 1;
        let mut pool = Self {
            backend,
            buffer,
            gain,
            rate,
            notifier,
            voices: Vec::with_capacity(size),
            retired: Vec::new(),
            current: 0,
            playing: false,
            next_voice_id: 0,
        };
        for _ in 0..size {
            let voice = pool.fresh_voice();
            pool.voices.push(voice);
        }
        pool
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
            Arc::clone(&self.notifier),
        )
    }

    /// Fire one voice now. Returns true when this trigger transitioned the
    /// pool from silent to sounding (the caller reports `Started` then).
    pub(crate) fn play(&mut self) -> bool {
        let size = self.voices.len();

        // Rotate off a busy slot instead of fighting an in-use voice.
        if self.voices[self.current].is_busy() {
            self.current = (self.current + 1) % size;
        }
        self.voices[self.current].start_at(self.backend.now());

        // Latency-hiding step: make sure the slot the next trigger will
        // rotate into holds a warm, idle voice. A busy occupant moves to
        // the retired list and keeps sounding until it decays or `stop`
        // silences it.
        let ahead = (self.current + 1) % size;
        if self.voices[ahead].is_busy() {
            let fresh = self.fresh_voice();
            let spare = mem::replace(&mut self.voices[ahead], fresh);
            self.retired.push(spare);
        }

        let started = !self.playing;
        self.playing = true;
        started
    }

    /// A pool voice completed naturally. A spent slot voice is replaced in
    /// place so its slot stays ready to fire; a spent retired voice is
    /// pruned. Returns true when the pool just fell silent (the caller
    /// reports `Ended` then).
    pub(crate) fn voice_ended(&mut self, id: u64) -> bool {
        if let Some(slot) = self.voices.iter().position(|v| v.id() == id) {
            self.voices[slot].mark_ended();
            self.voices[slot] = self.fresh_voice();
        } else if let Some(pos) = self.retired.iter().position(|v| v.id() == id) {
            self.retired.remove(pos);
        } else {
            debug!(voice_id = id, "completion from unknown voice ignored");
            return false;
        }

        if self.playing && self.retired.is_empty() && !self.voices.iter().any(|v| v.is_busy()) {
            self.playing = false;
            return true;
        }
        false
    }

    /// Silence every busy voice and rebuild the pool fresh. Returns true
    /// when the pool was sounding (the caller reports `Stopped` then).
    pub(crate) fn stop(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        self.playing = false;
        for voice in &mut self.retired {
            voice.silence();
        }
        self.retired.clear();
        for voice in &mut self.voices {
            if voice.is_busy() {
                voice.silence();
            }
        }
        let size = self.voices.len();
        self.voices.clear();
        for _ in 0..size {
            let voice = self.fresh_voice();
            self.voices.push(voice);
        }
        self.current = 0;
        true
    }

    /// Apply a new playback rate to every pool voice, sounding or idle,
    /// including retired voices still ringing out.
    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        for voice in &mut self.voices {
            voice.set_rate(rate);
        }
        for voice in &mut self.retired {
            voice.set_rate(rate);
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> usize {
        self.voices.len()
    }

    #[cfg(test)]
    pub(crate) fn idle_at_next_slot(&self) -> bool {
        let slot = if self.voices[self.current].is_busy() {
            (self.current + 1) % self.voices.len()
        } else {
            self.current
        };
        !self.voices[slot].is_busy()
    }
}
