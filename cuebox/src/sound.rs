//! The sound facade
//!
//! [`Sound`] is the object callers interact with: readiness and duration
//! queries, volume and rate control, play/stop/end, and lifecycle
//! notifications. Behind it sits either a [`VoicePool`] (multishot) or a
//! [`LoopScheduler`] (loop), built lazily once the backing audio decodes.
//!
//! Ownership is deliberately simple: all pool and loop mutation happens
//! under one mutex, reached only from facade calls and completion
//! callbacks, so the voice machinery itself needs no further locking.
//! Lifecycle events queue in a pending deque drained by the outermost
//! call frame, which makes callbacks safe to re-enter the facade from.

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, GainStage};
use crate::config::{volume_to_gain, SoundConfig, SoundType, MAX_VOLUME};
use crate::error::{Error, Result};
use crate::events::{SoundCallbacks, SoundEvent};
use crate::playback::looper::{LoopPhase, LoopScheduler, WakeNotifier};
use crate::playback::pool::VoicePool;
use crate::playback::voice::EndedNotifier;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Observable lifecycle state of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundState {
    /// Backing audio has not finished decoding yet
    Loading,

    /// Fetch or decode failed; permanently not ready
    Failed,

    /// Ready and silent
    Idle,

    /// Scheduled to start in the future (loop mode)
    Waiting,

    Playing,

    /// Loop mode after `end()`: the final iteration is ringing out
    Ending,
}

impl std::fmt::Display for SoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundState::Loading => write!(f, "loading"),
            SoundState::Failed => write!(f, "failed"),
            SoundState::Idle => write!(f, "idle"),
            SoundState::Waiting => write!(f, "waiting"),
            SoundState::Playing => write!(f, "playing"),
            SoundState::Ending => write!(f, "ending"),
        }
    }
}

enum Driver {
    Pool(VoicePool),
    Loop(LoopScheduler),
}

struct SoundInner {
    concurrency: usize,
    volume: f64,
    rate: f64,
    audio: Option<Arc<DecodedAudio>>,
    load_error: Option<Arc<Error>>,
    driver: Option<Driver>,
}

pub(crate) struct SoundShared {
    id: Uuid,
    sound_type: SoundType,
    backend: Arc<dyn AudioBackend>,
    gain: Arc<dyn GainStage>,
    inner: Mutex<SoundInner>,
    callbacks: Mutex<SoundCallbacks>,
    pending: Mutex<VecDeque<SoundEvent>>,
    dispatching: AtomicBool,
}

/// Handle to one sound. Cheap to clone; all clones observe and control the
/// same playback state. Dropping every handle lets voices that are still
/// sounding finish and self-clean.
#[derive(Clone)]
pub struct Sound {
    shared: Arc<SoundShared>,
}

impl Sound {
    /// Build the facade; the engine resolves the source afterwards via
    /// [`SoundShared::finish_load`].
    pub(crate) fn create(
        backend: Arc<dyn AudioBackend>,
        config: SoundConfig,
    ) -> (Self, Arc<SoundShared>) {
        let gain = backend.create_gain();
        gain.set_gain(volume_to_gain(config.volume));

        let shared = Arc::new(SoundShared {
            id: Uuid::new_v4(),
            sound_type: config.sound_type,
            backend,
            gain,
            inner: Mutex::new(SoundInner {
                concurrency: config.concurrency,
                volume: config.volume.clamp(0.0, MAX_VOLUME),
                rate: config.playback_rate,
                audio: None,
                load_error: None,
                driver: None,
            }),
            callbacks: Mutex::new(config.callbacks),
            pending: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }

    /// Stable identifier for log correlation.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn sound_type(&self) -> SoundType {
        self.shared.sound_type
    }

    /// True once the backing audio has decoded.
    pub fn is_ready(&self) -> bool {
        self.shared.inner.lock().unwrap().audio.is_some()
    }

    /// Clip duration in seconds; 0.0 until ready.
    pub fn duration(&self) -> f64 {
        self.shared
            .inner
            .lock()
            .unwrap()
            .audio
            .as_ref()
            .map(|a| a.duration())
            .unwrap_or(0.0)
    }

    pub fn state(&self) -> SoundState {
        let inner = self.shared.inner.lock().unwrap();
        if inner.load_error.is_some() {
            return SoundState::Failed;
        }
        if inner.audio.is_none() {
            return SoundState::Loading;
        }
        match inner.driver.as_ref() {
            Some(Driver::Pool(pool)) if pool.is_playing() => SoundState::Playing,
            Some(Driver::Loop(looper)) => match looper.phase() {
                LoopPhase::Idle => SoundState::Idle,
                LoopPhase::Waiting => SoundState::Waiting,
                LoopPhase::Playing if looper.is_breaking() => SoundState::Ending,
                LoopPhase::Playing => SoundState::Playing,
            },
            _ => SoundState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state(), SoundState::Playing | SoundState::Ending)
    }

    pub fn is_waiting(&self) -> bool {
        self.state() == SoundState::Waiting
    }

    /// Caller-facing volume on the 0..=100 scale.
    pub fn volume(&self) -> f64 {
        self.shared.inner.lock().unwrap().volume
    }

    /// Set volume. Clamped to [0, 100]; applied through the shared gain
    /// stage with the perceptual square curve, so it reaches voices that
    /// are already sounding.
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "Volume must be finite, got {}",
                volume
            )));
        }
        let clamped = volume.clamp(0.0, MAX_VOLUME);
        self.shared.inner.lock().unwrap().volume = clamped;
        self.shared.gain.set_gain(volume_to_gain(clamped));
        Ok(())
    }

    pub fn playback_rate(&self) -> f64 {
        self.shared.inner.lock().unwrap().rate
    }

    /// Set playback rate. New voices inherit it at creation; voices
    /// already scheduled or sounding pick it up live.
    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "Playback rate must be finite and positive, got {}",
                rate
            )));
        }
        let mut inner = self.shared.inner.lock().unwrap();
        inner.rate = rate;
        match inner.driver.as_mut() {
            Some(Driver::Pool(pool)) => pool.set_rate(rate),
            Some(Driver::Loop(looper)) => looper.set_rate(rate),
            None => {}
        }
        Ok(())
    }

    /// Scheduled start of the next loop iteration, while looping.
    pub fn next_loop_time(&self) -> Option<f64> {
        match self.shared.inner.lock().unwrap().driver.as_ref() {
            Some(Driver::Loop(looper)) => looper.next_start(),
            _ => None,
        }
    }

    /// Start playback now. Safely ignored while loading (a benign race,
    /// not an error) and while a loop is already playing or waiting.
    pub fn play(&self) {
        self.play_inner(None);
    }

    /// Start playback at `at_time` on the backend clock. Scheduling is a
    /// loop-mode feature; a multishot sound fires immediately.
    pub fn play_at(&self, at_time: f64) {
        if !at_time.is_finite() {
            warn!(sound_id = %self.shared.id, at_time, "play_at ignored: non-finite time");
            return;
        }
        self.play_inner(Some(at_time));
    }

    fn play_inner(&self, at: Option<f64>) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.driver.as_mut() {
                None => {
                    debug!(sound_id = %self.shared.id, "play ignored: not ready");
                }
                Some(Driver::Pool(pool)) => {
                    if pool.play() {
                        self.shared.enqueue(SoundEvent::Started);
                    }
                }
                Some(Driver::Loop(looper)) => {
                    if let Some(event) = looper.play(at) {
                        self.shared.enqueue(event);
                    }
                }
            }
        }
        self.shared.dispatch();
    }

    /// Hard stop: silence everything that is sounding and return to idle.
    /// No-op when there is nothing to stop.
    pub fn stop(&self) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.driver.as_mut() {
                None => {
                    debug!(sound_id = %self.shared.id, "stop ignored: not ready");
                }
                Some(Driver::Pool(pool)) => {
                    if pool.stop() {
                        self.shared.enqueue(SoundEvent::Stopped);
                    }
                }
                Some(Driver::Loop(looper)) => {
                    if let Some(event) = looper.stop() {
                        self.shared.enqueue(event);
                    }
                }
            }
        }
        self.shared.dispatch();
    }

    /// Graceful stop for loops: no further iteration begins, the current
    /// one finishes naturally, then the terminal notification fires.
    /// Multishot sounds end on their own when the last voice decays, so
    /// this is a no-op for them.
    pub fn end(&self) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.driver.as_mut() {
                Some(Driver::Loop(looper)) => looper.end(),
                Some(Driver::Pool(_)) => {
                    debug!(sound_id = %self.shared.id, "end ignored: multishot sounds end naturally");
                }
                None => {
                    debug!(sound_id = %self.shared.id, "end ignored: not ready");
                }
            }
        }
        self.shared.dispatch();
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.shared.id)
            .field("type", &self.shared.sound_type)
            .field("state", &self.state())
            .finish()
    }
}

impl SoundShared {
    /// Resolve the loading sequence. On success the driver is built and
    /// the sound becomes playable; on failure it is permanently not ready
    /// but the host keeps running.
    pub(crate) fn finish_load(self: &Arc<Self>, result: Result<Arc<DecodedAudio>>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.audio.is_some() || inner.load_error.is_some() {
                debug!(sound_id = %self.id, "duplicate load completion ignored");
                return;
            }
            match result {
                Ok(audio) => {
                    let weak = Arc::downgrade(self);
                    let ended: EndedNotifier = Arc::new(move |voice_id: u64| {
                        if let Some(shared) = Weak::upgrade(&weak) {
                            shared.handle_voice_ended(voice_id);
                        }
                    });

                    let driver = match self.sound_type {
                        SoundType::Multishot => Driver::Pool(VoicePool::new(
                            Arc::clone(&self.backend),
                            Arc::clone(&audio),
                            Arc::clone(&self.gain),
                            inner.rate,
                            inner.concurrency,
                            ended,
                        )),
                        SoundType::Loop => {
                            let weak = Arc::downgrade(self);
                            let wake: WakeNotifier = Arc::new(move || {
                                if let Some(shared) = Weak::upgrade(&weak) {
                                    shared.handle_wake();
                                }
                            });
                            Driver::Loop(LoopScheduler::new(
                                Arc::clone(&self.backend),
                                Arc::clone(&audio),
                                Arc::clone(&self.gain),
                                inner.rate,
                                ended,
                                wake,
                            ))
                        }
                    };

                    debug!(
                        sound_id = %self.id,
                        duration = audio.duration(),
                        "sound ready"
                    );
                    inner.audio = Some(audio);
                    inner.driver = Some(driver);
                    self.enqueue(SoundEvent::Loaded);
                }
                Err(error) => {
                    warn!(sound_id = %self.id, %error, "sound failed to load");
                    let error = Arc::new(error);
                    inner.load_error = Some(Arc::clone(&error));
                    self.enqueue(SoundEvent::LoadFailed(error));
                }
            }
        }
        self.dispatch();
    }

    /// A voice completed naturally (stop-triggered completions are
    /// suppressed before they reach this point).
    fn handle_voice_ended(&self, voice_id: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.driver.as_mut() {
                Some(Driver::Pool(pool)) => {
                    if pool.voice_ended(voice_id) {
                        self.enqueue(SoundEvent::Ended);
                    }
                }
                Some(Driver::Loop(looper)) => {
                    if let Some(event) = looper.voice_ended(voice_id) {
                        self.enqueue(event);
                    }
                }
                None => {}
            }
        }
        self.dispatch();
    }

    /// The advisory deferred-start wake fired.
    fn handle_wake(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(Driver::Loop(looper)) = inner.driver.as_mut() {
                if let Some(event) = looper.wake_elapsed() {
                    self.enqueue(event);
                }
            }
        }
        self.dispatch();
    }

    fn enqueue(&self, event: SoundEvent) {
        self.pending.lock().unwrap().push_back(event);
    }

    /// Drain pending events into the caller-supplied callbacks. Only the
    /// outermost frame drains; events queued from inside a callback are
    /// picked up by the drain loop already running below it.
    fn dispatch(&self) {
        loop {
            if self.dispatching.swap(true, Ordering::SeqCst) {
                return;
            }
            loop {
                let event = self.pending.lock().unwrap().pop_front();
                match event {
                    Some(event) => self.fire(event),
                    None => break,
                }
            }
            self.dispatching.store(false, Ordering::SeqCst);
            // Re-check: an event may have landed between the final pop and
            // clearing the flag.
            if self.pending.lock().unwrap().is_empty() {
                return;
            }
        }
    }

    fn fire(&self, event: SoundEvent) {
        debug!(sound_id = %self.id, event = ?event, "sound event");
        let mut callbacks = self.callbacks.lock().unwrap();
        match event {
            SoundEvent::Loaded => {
                if let Some(cb) = callbacks.on_load.as_mut() {
                    cb();
                }
            }
            SoundEvent::LoadFailed(error) => {
                if let Some(cb) = callbacks.on_error.as_mut() {
                    cb(&error);
                }
            }
            SoundEvent::Started => {
                if let Some(cb) = callbacks.on_play.as_mut() {
                    cb();
                }
            }
            SoundEvent::Stopped => {
                if let Some(cb) = callbacks.on_stop.as_mut() {
                    cb();
                }
            }
            SoundEvent::Loop { next_start } => {
                if let Some(cb) = callbacks.on_loop.as_mut() {
                    cb(next_start);
                }
            }
            SoundEvent::Waiting { start } => {
                if let Some(cb) = callbacks.on_wait.as_mut() {
                    cb(start);
                }
            }
            SoundEvent::WaitCancelled => {
                if let Some(cb) = callbacks.on_wait_cancel.as_mut() {
                    cb();
                }
            }
            SoundEvent::Ended => {
                if let Some(cb) = callbacks.on_end.as_mut() {
                    cb();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::SoundSource;

    fn ready_sound(sound_type: SoundType) -> (Sound, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let buffer = DecodedAudio::silence(1.0, 44100).unwrap().into_shared();
        let config = SoundConfig::new(SoundSource::Buffer(Arc::clone(&buffer)), sound_type);
        let (sound, shared) = Sound::create(Arc::clone(&backend) as Arc<dyn AudioBackend>, config);
        shared.finish_load(Ok(buffer));
        (sound, backend)
    }

    #[test]
    fn test_play_before_ready_is_ignored() {
        let backend = Arc::new(MockBackend::new());
        let buffer = DecodedAudio::silence(1.0, 44100).unwrap().into_shared();
        let config = SoundConfig::new(SoundSource::Buffer(buffer), SoundType::Multishot);
        let (sound, _shared) = Sound::create(backend as Arc<dyn AudioBackend>, config);

        assert_eq!(sound.state(), SoundState::Loading);
        sound.play(); // must not panic or create voices
        assert!(!sound.is_playing());
    }

    #[test]
    fn test_ready_sound_reports_duration() {
        let (sound, _) = ready_sound(SoundType::Multishot);
        assert!(sound.is_ready());
        assert!((sound.duration() - 1.0).abs() < 1e-9);
        assert_eq!(sound.state(), SoundState::Idle);
    }

    #[test]
    fn test_volume_setter_applies_square_curve_to_gain() {
        let (sound, backend) = ready_sound(SoundType::Multishot);
        sound.set_volume(50.0).unwrap();
        sound.play();
        let gains: Vec<f64> = backend.snapshot().iter().map(|v| v.gain).collect();
        assert!(gains.iter().all(|&g| (g - 0.25).abs() < 1e-12));
        assert_eq!(sound.volume(), 50.0);
    }

    #[test]
    fn test_volume_clamps_above_max() {
        let (sound, _) = ready_sound(SoundType::Multishot);
        sound.set_volume(250.0).unwrap();
        assert_eq!(sound.volume(), 100.0);
    }

    #[test]
    fn test_volume_rejects_nan_state_unchanged() {
        let (sound, _) = ready_sound(SoundType::Multishot);
        sound.set_volume(30.0).unwrap();
        assert!(matches!(
            sound.set_volume(f64::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(sound.volume(), 30.0);
    }

    #[test]
    fn test_rate_rejects_non_positive() {
        let (sound, _) = ready_sound(SoundType::Loop);
        assert!(sound.set_playback_rate(0.0).is_err());
        assert!(sound.set_playback_rate(-1.0).is_err());
        assert_eq!(sound.playback_rate(), 1.0);
        sound.set_playback_rate(1.25).unwrap();
        assert_eq!(sound.playback_rate(), 1.25);
    }

    #[test]
    fn test_loop_states() {
        let (sound, backend) = ready_sound(SoundType::Loop);
        assert_eq!(sound.state(), SoundState::Idle);

        sound.play_at(2.0);
        assert_eq!(sound.state(), SoundState::Waiting);
        assert!(sound.is_waiting());

        backend.advance(2.0);
        assert_eq!(sound.state(), SoundState::Playing);

        sound.end();
        assert_eq!(sound.state(), SoundState::Ending);
        assert!(sound.is_playing());

        backend.advance(2.0);
        assert_eq!(sound.state(), SoundState::Idle);
    }

    #[test]
    fn test_stop_then_play_immediately() {
        let (sound, backend) = ready_sound(SoundType::Multishot);
        sound.play();
        sound.stop();
        sound.play();
        assert_eq!(backend.sounding_count(), 1);
        assert!(sound.is_playing());
    }

    #[test]
    fn test_stop_from_within_callback_does_not_deadlock() {
        let backend = Arc::new(MockBackend::new());
        let buffer = DecodedAudio::silence(0.5, 44100).unwrap().into_shared();
        let mut config = SoundConfig::new(SoundSource::Buffer(Arc::clone(&buffer)), SoundType::Loop);

        // Stop the loop from inside its own iteration callback.
        let slot: Arc<Mutex<Option<Sound>>> = Arc::new(Mutex::new(None));
        let slot_in_cb = Arc::clone(&slot);
        config.callbacks.on_loop = Some(Box::new(move |_| {
            if let Some(sound) = slot_in_cb.lock().unwrap().as_ref() {
                sound.stop();
            }
        }));

        let (sound, shared) = Sound::create(Arc::clone(&backend) as Arc<dyn AudioBackend>, config);
        shared.finish_load(Ok(buffer));
        *slot.lock().unwrap() = Some(sound.clone());

        sound.play();
        backend.advance(2.0);
        assert_eq!(sound.state(), SoundState::Idle);
        assert_eq!(backend.sounding_count(), 0);
    }

    #[test]
    fn test_next_loop_time_tracks_schedule() {
        let (sound, backend) = ready_sound(SoundType::Loop);
        assert_eq!(sound.next_loop_time(), None);
        sound.play();
        assert_eq!(sound.next_loop_time(), Some(1.0));
        backend.advance(1.0);
        assert_eq!(sound.next_loop_time(), Some(2.0));
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&SoundState::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::from_str::<SoundState>("\"ending\"").unwrap(),
            SoundState::Ending
        );
    }

    #[test]
    fn test_load_failure_is_terminal() {
        let backend = Arc::new(MockBackend::new());
        let buffer = DecodedAudio::silence(1.0, 44100).unwrap().into_shared();
        let config = SoundConfig::new(SoundSource::Buffer(buffer), SoundType::Multishot);
        let (sound, shared) = Sound::create(backend as Arc<dyn AudioBackend>, config);

        shared.finish_load(Err(Error::Decode("bad stream".to_string())));
        assert_eq!(sound.state(), SoundState::Failed);
        sound.play(); // still a safe no-op
        assert!(!sound.is_playing());
    }
}
