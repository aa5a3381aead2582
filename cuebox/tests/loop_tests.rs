//! Gapless loop tests through the public facade
//!
//! Exercises dual-voice lookahead scheduling: iterations chain without
//! gaps, deferred starts notify and cancel correctly, end() finishes the
//! current iteration, and stop() cuts everything at once.

use cuebox::{
    AudioBackend, DecodedAudio, MockBackend, Sound, SoundConfig, SoundEngine, SoundSource,
    SoundType,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

fn clip(duration: f64) -> Arc<DecodedAudio> {
    DecodedAudio::silence(duration, 44100).unwrap().into_shared()
}

fn make_loop(
    backend: &Arc<MockBackend>,
    duration: f64,
    configure: impl FnOnce(&mut SoundConfig),
) -> Sound {
    let engine = SoundEngine::new(Arc::clone(backend) as Arc<dyn AudioBackend>);
    let mut config = SoundConfig::new(SoundSource::Buffer(clip(duration)), SoundType::Loop);
    configure(&mut config);
    engine.create_sound(config).unwrap()
}

#[test]
fn test_both_iterations_scheduled_up_front() {
    let backend = Arc::new(MockBackend::new());
    let sound = make_loop(&backend, 0.5, |_| {});

    sound.play();

    // Current iteration plus the lookahead, back to back.
    assert_eq!(backend.voices_created(), 2);
    let starts: Vec<Option<f64>> = backend.snapshot().iter().map(|v| v.started_at).collect();
    assert_eq!(starts, vec![Some(0.0), Some(0.5)]);
    assert_eq!(sound.next_loop_time(), Some(0.5));
}

#[test]
fn test_loop_notifications_carry_next_start() {
    let backend = Arc::new(MockBackend::new());
    let next_starts: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&next_starts);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_loop = Some(Box::new(move |next_start| {
            recorded.lock().unwrap().push(next_start);
        }));
    });

    sound.play();
    backend.advance(1.1); // iterations complete at 0.5 and 1.0

    assert_eq!(*next_starts.lock().unwrap(), vec![1.0, 1.5]);
    assert!(sound.is_playing());
    assert_eq!(sound.next_loop_time(), Some(1.5));
}

#[test]
fn test_lookahead_always_one_iteration_ahead() {
    let backend = Arc::new(MockBackend::new());
    let sound = make_loop(&backend, 0.5, |_| {});

    sound.play();
    backend.advance(2.3);

    // One voice per completed iteration plus the live pair.
    assert_eq!(backend.live_count(), 2);
    let starts: Vec<f64> = backend
        .snapshot()
        .iter()
        .filter_map(|v| v.started_at)
        .collect();
    for (k, start) in starts.iter().enumerate() {
        assert!((start - 0.5 * k as f64).abs() < 1e-9);
    }
}

#[test]
fn test_schedule_does_not_drift_over_many_iterations() {
    let backend = Arc::new(MockBackend::new());
    let next_starts: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&next_starts);
    let sound = make_loop(&backend, 0.25, |c| {
        c.callbacks.on_loop = Some(Box::new(move |next_start| {
            recorded.lock().unwrap().push(next_start);
        }));
    });

    sound.play();
    for _ in 0..100 {
        backend.advance(0.25);
    }

    let recorded = next_starts.lock().unwrap();
    assert_eq!(recorded.len(), 100);
    // Starts accumulate from scheduled times, never from observed clock
    // readings, so iteration k begins exactly at k * duration.
    for (k, next_start) in recorded.iter().enumerate() {
        let expected = 0.25 * (k + 2) as f64;
        assert!(
            (next_start - expected).abs() < 1e-9,
            "iteration {}: expected {}, got {}",
            k,
            expected,
            next_start
        );
    }
}

#[test]
fn test_deferred_start_waits_then_plays() {
    let backend = Arc::new(MockBackend::new());
    let waits: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&waits);
    let plays = Arc::new(AtomicU32::new(0));
    let plays_cb = Arc::clone(&plays);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_wait = Some(Box::new(move |start| {
            recorded.lock().unwrap().push(start);
        }));
        c.callbacks.on_play = Some(Box::new(move || {
            plays_cb.fetch_add(1, Ordering::SeqCst);
        }));
    });

    sound.play_at(2.0);
    assert!(sound.is_waiting());
    assert_eq!(*waits.lock().unwrap(), vec![2.0]);
    assert_eq!(plays.load(Ordering::SeqCst), 0);

    // Audio is scheduled up front; the wake only flips state and
    // notifies.
    let starts: Vec<Option<f64>> = backend.snapshot().iter().map(|v| v.started_at).collect();
    assert_eq!(starts, vec![Some(2.0), Some(2.5)]);

    backend.advance(2.0);
    assert!(sound.is_playing());
    assert_eq!(plays.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_while_waiting_cancels_the_wait() {
    let backend = Arc::new(MockBackend::new());
    let cancels = Arc::new(AtomicU32::new(0));
    let cancels_cb = Arc::clone(&cancels);
    let stops = Arc::new(AtomicU32::new(0));
    let stops_cb = Arc::clone(&stops);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_wait_cancel = Some(Box::new(move || {
            cancels_cb.fetch_add(1, Ordering::SeqCst);
        }));
        c.callbacks.on_stop = Some(Box::new(move || {
            stops_cb.fetch_add(1, Ordering::SeqCst);
        }));
    });

    sound.play_at(5.0);
    sound.stop();

    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 0);
    assert!(!sound.is_waiting());

    // Nothing becomes audible after the cancelled start time.
    backend.advance(6.0);
    assert_eq!(backend.sounding_count(), 0);
}

#[test]
fn test_end_finishes_current_iteration_then_notifies() {
    let backend = Arc::new(MockBackend::new());
    let ends = Arc::new(AtomicU32::new(0));
    let ends_cb = Arc::clone(&ends);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_end = Some(Box::new(move || {
            ends_cb.fetch_add(1, Ordering::SeqCst);
        }));
    });

    sound.play();
    backend.advance(0.7); // second iteration underway
    sound.end();
    assert!(sound.is_playing()); // still ringing out
    assert_eq!(ends.load(Ordering::SeqCst), 0);

    backend.advance(0.3); // current iteration ends at 1.0
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert!(!sound.is_playing());
    assert_eq!(backend.sounding_count(), 0);

    // No further iteration sneaks in afterwards.
    backend.advance(2.0);
    assert_eq!(backend.sounding_count(), 0);
}

#[test]
fn test_loop_restarts_after_end() {
    let backend = Arc::new(MockBackend::new());
    let sound = make_loop(&backend, 0.5, |_| {});

    sound.play();
    sound.end();
    backend.advance(1.0);
    assert!(!sound.is_playing());

    sound.play();
    assert!(sound.is_playing());
    backend.advance(1.6);
    assert!(sound.is_playing());
}

#[test]
fn test_stop_cuts_both_voices_immediately() {
    let backend = Arc::new(MockBackend::new());
    let stops = Arc::new(AtomicU32::new(0));
    let stops_cb = Arc::clone(&stops);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_stop = Some(Box::new(move || {
            stops_cb.fetch_add(1, Ordering::SeqCst);
        }));
    });

    sound.play();
    backend.advance(0.2);
    sound.stop();

    assert_eq!(backend.sounding_count(), 0);
    assert_eq!(backend.scheduled_count(), 0);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(sound.next_loop_time(), None);
}

#[test]
fn test_play_is_ignored_while_looping() {
    let backend = Arc::new(MockBackend::new());
    let sound = make_loop(&backend, 0.5, |_| {});

    sound.play();
    let created = backend.voices_created();
    sound.play();
    sound.play();

    assert_eq!(backend.voices_created(), created);
}

#[test]
fn test_end_then_stop_before_ringout_completes() {
    let backend = Arc::new(MockBackend::new());
    let ends = Arc::new(AtomicU32::new(0));
    let ends_cb = Arc::clone(&ends);
    let sound = make_loop(&backend, 0.5, |c| {
        c.callbacks.on_end = Some(Box::new(move || {
            ends_cb.fetch_add(1, Ordering::SeqCst);
        }));
    });

    sound.play();
    sound.end();
    sound.stop(); // hard stop wins over the graceful wind-down

    assert_eq!(backend.sounding_count(), 0);
    backend.advance(2.0);
    assert_eq!(ends.load(Ordering::SeqCst), 0);
    assert!(!sound.is_playing());
}
