//! End-to-end load pipeline tests
//!
//! Drives the real fetch and decode services against generated WAV
//! files on disk, with the mock backend standing in for the audio
//! device: create, load asynchronously, then play.

use cuebox::{
    AudioBackend, MockBackend, SoundConfig, SoundEngine, SoundSource, SoundState, SoundType,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Surface crate logs when a pipeline test runs with RUST_LOG set.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write a stereo 16-bit WAV of the given length into a temp file.
fn write_wav(duration: f64, sample_rate: u32) -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
    let frames = (duration * sample_rate as f64).round() as usize;
    for frame in 0..frames {
        let value = ((frame as f32 * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    file
}

/// Create the sound and wait for its load to resolve.
async fn load_sound(
    engine: &SoundEngine,
    source: SoundSource,
    sound_type: SoundType,
) -> (cuebox::Sound, Result<(), String>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut config = SoundConfig::new(source, sound_type);
    {
        let tx = tx.clone();
        config.callbacks.on_load = Some(Box::new(move || {
            let _ = tx.send(Ok(()));
        }));
    }
    config.callbacks.on_error = Some(Box::new(move |error| {
        let _ = tx.send(Err(error.to_string()));
    }));

    let sound = engine.create_sound(config).unwrap();
    let outcome = rx.recv().await.expect("load resolution");
    (sound, outcome)
}

#[tokio::test]
async fn test_wav_file_loads_and_plays() {
    init_tracing();
    let file = write_wav(0.5, 44100);
    let backend = Arc::new(MockBackend::new());
    let engine = SoundEngine::new(Arc::clone(&backend) as Arc<dyn AudioBackend>);

    let (sound, outcome) = load_sound(
        &engine,
        SoundSource::File(file.path().to_path_buf()),
        SoundType::Multishot,
    )
    .await;

    outcome.unwrap();
    assert!(sound.is_ready());
    assert!((sound.duration() - 0.5).abs() < 1e-3);

    sound.play();
    assert_eq!(backend.sounding_count(), 1);
    backend.advance(1.0);
    assert_eq!(backend.sounding_count(), 0);
}

#[tokio::test]
async fn test_wav_loop_duration_drives_iteration_length() {
    init_tracing();
    let file = write_wav(0.25, 48000);
    let backend = Arc::new(MockBackend::new());
    let engine = SoundEngine::new(Arc::clone(&backend) as Arc<dyn AudioBackend>);

    let (sound, outcome) = load_sound(
        &engine,
        SoundSource::File(file.path().to_path_buf()),
        SoundType::Loop,
    )
    .await;

    outcome.unwrap();
    sound.play();
    let next = sound.next_loop_time().unwrap();
    assert!((next - sound.duration()).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_file_fails_without_tearing_anything_down() {
    init_tracing();
    let backend = Arc::new(MockBackend::new());
    let engine = SoundEngine::new(Arc::clone(&backend) as Arc<dyn AudioBackend>);

    let (sound, outcome) = load_sound(
        &engine,
        SoundSource::File(PathBuf::from("/nonexistent/clip.wav")),
        SoundType::Multishot,
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(sound.state(), SoundState::Failed);
    assert_eq!(sound.duration(), 0.0);

    // The failed sound is inert but harmless.
    sound.play();
    sound.stop();
    assert_eq!(backend.voices_created(), 0);
}

#[tokio::test]
async fn test_unsupported_bytes_fail_at_decode() {
    init_tracing();
    let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
    std::fs::write(file.path(), b"not an audio file at all").unwrap();

    let backend = Arc::new(MockBackend::new());
    let engine = SoundEngine::new(Arc::clone(&backend) as Arc<dyn AudioBackend>);

    let (sound, outcome) = load_sound(
        &engine,
        SoundSource::File(file.path().to_path_buf()),
        SoundType::Loop,
    )
    .await;

    let message = outcome.unwrap_err();
    assert!(message.contains("decode") || message.contains("Decode") || message.contains("format"));
    assert_eq!(sound.state(), SoundState::Failed);
}
