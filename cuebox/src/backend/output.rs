//! Real-time audio output via cpal
//!
//! [`CpalBackend`] renders voices through the system's output device. The
//! cpal `Stream` is not `Send`, so a dedicated thread owns it for the
//! backend's lifetime; control handles communicate with the audio
//! callback through shared atomics and the mixer voice table.
//!
//! The playback clock is derived from frames actually written to the
//! device (`frames_written / sample_rate`), so scheduled voice starts are
//! sample-accurate regardless of callback jitter.
//!
//! Completion callbacks never run on the audio thread: the callback posts
//! finished voices to a reaper thread, which invokes them with no backend
//! lock held.

use crate::audio::types::DecodedAudio;
use crate::backend::{AudioBackend, EndedFn, GainStage, VoiceHandle, WakeHandle};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Poll interval for advisory wakes and the stream thread's shutdown
/// check.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lock-free gain stage; read every callback on the audio thread.
struct CpalGain {
    bits: AtomicU64,
}

impl GainStage for CpalGain {
    fn set_gain(&self, gain: f64) {
        self.bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn gain(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Control block shared between a voice handle and the audio callback.
struct VoiceCtl {
    /// Clock time to begin sounding; None until `start` is called.
    start_time: Mutex<Option<f64>>,
    rate_bits: AtomicU64,
    stopped: AtomicBool,
}

/// One voice in the mixer table, owned by the audio callback.
struct ActiveVoice {
    ctl: Arc<VoiceCtl>,
    buffer: Arc<DecodedAudio>,
    gain: Arc<dyn GainStage>,
    /// Read position in buffer frames (fractional for resampling).
    src_pos: f64,
    on_ended: Option<EndedFn>,
}

struct Mixer {
    voices: Mutex<Vec<ActiveVoice>>,
    frames_written: AtomicU64,
    /// Output stream sample rate; set once by the stream thread.
    sample_rate: AtomicU32,
}

impl Mixer {
    fn clock(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.frames_written.load(Ordering::Relaxed) as f64 / rate as f64
    }
}

struct CpalVoice {
    ctl: Arc<VoiceCtl>,
}

impl Drop for CpalVoice {
    fn drop(&mut self) {
        // A voice that never started has no natural end, so its mixer
        // entry would linger forever once the handle is gone. Started
        // voices keep sounding and self-clean when they run out.
        if self.ctl.start_time.lock().unwrap().is_none() {
            self.ctl.stopped.store(true, Ordering::Release);
        }
    }
}

impl VoiceHandle for CpalVoice {
    fn start(&mut self, at_time: f64) {
        let mut start = self.ctl.start_time.lock().unwrap();
        if start.is_none() {
            *start = Some(at_time);
        }
    }

    fn stop(&mut self) {
        self.ctl.stopped.store(true, Ordering::Release);
    }

    fn set_rate(&mut self, rate: f64) {
        self.ctl.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }
}

struct CpalWake {
    cancelled: Arc<AtomicBool>,
}

impl WakeHandle for CpalWake {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Real-time backend over the system audio device.
pub struct CpalBackend {
    mixer: Arc<Mixer>,
    shutdown: Arc<AtomicBool>,
    stream_thread: Option<JoinHandle<()>>,
    reaper_thread: Option<JoinHandle<()>>,
}

impl CpalBackend {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        Self::with_device(None)
    }

    /// Open a named output device, falling back to the default when the
    /// name does not match.
    pub fn with_device(device_name: Option<String>) -> Result<Self> {
        let mixer = Arc::new(Mixer {
            voices: Mutex::new(Vec::new()),
            frames_written: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ended_tx, ended_rx) = mpsc::channel::<EndedFn>();
        let reaper_thread = thread::Builder::new()
            .name("cuebox-reaper".to_string())
            .spawn(move || {
                for callback in ended_rx {
                    callback();
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn reaper thread: {}", e)))?;

        // The cpal Stream is !Send, so one thread opens the device, owns
        // the stream, and tears it down at shutdown.
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();
        let stream_mixer = Arc::clone(&mixer);
        let stream_shutdown = Arc::clone(&shutdown);
        let stream_thread = thread::Builder::new()
            .name("cuebox-output".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name, stream_mixer, ended_tx) {
                    Ok(stream) => {
                        let _ = init_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                while !stream_shutdown.load(Ordering::Acquire) {
                    thread::park_timeout(POLL_INTERVAL);
                }
                drop(stream);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let backend = Self {
            mixer,
            shutdown,
            stream_thread: Some(stream_thread),
            reaper_thread: Some(reaper_thread),
        };

        init_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during setup".to_string()))??;
        Ok(backend)
    }
}

impl AudioBackend for CpalBackend {
    fn now(&self) -> f64 {
        self.mixer.clock()
    }

    fn create_gain(&self) -> Arc<dyn GainStage> {
        Arc::new(CpalGain {
            bits: AtomicU64::new(1.0f64.to_bits()),
        })
    }

    fn create_voice(
        &self,
        buffer: Arc<DecodedAudio>,
        gain: Arc<dyn GainStage>,
        rate: f64,
        on_ended: EndedFn,
    ) -> Box<dyn VoiceHandle> {
        let ctl = Arc::new(VoiceCtl {
            start_time: Mutex::new(None),
            rate_bits: AtomicU64::new(rate.to_bits()),
            stopped: AtomicBool::new(false),
        });
        self.mixer.voices.lock().unwrap().push(ActiveVoice {
            ctl: Arc::clone(&ctl),
            buffer,
            gain,
            src_pos: 0.0,
            on_ended: Some(on_ended),
        });
        Box::new(CpalVoice { ctl })
    }

    fn schedule_wake(&self, at_time: f64, wake: Box<dyn FnOnce() + Send>) -> Box<dyn WakeHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);
        let mixer = Arc::clone(&self.mixer);
        let spawned = thread::Builder::new()
            .name("cuebox-wake".to_string())
            .spawn(move || {
                while mixer.clock() < at_time {
                    if thread_cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                if !thread_cancelled.load(Ordering::Acquire) {
                    wake();
                }
            });
        if let Err(e) = spawned {
            error!("Failed to spawn wake thread: {}", e);
            cancelled.store(true, Ordering::Release);
        }
        Box::new(CpalWake { cancelled })
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.stream_thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Output thread panicked during shutdown");
            }
        }
        // The stream thread owned the last ended sender, so the reaper's
        // channel is now closed and it drains out.
        if let Some(handle) = self.reaper_thread.take() {
            if handle.join().is_err() {
                warn!("Reaper thread panicked during shutdown");
            }
        }
    }
}

/// Open the output device and start the stream. Runs on the stream
/// thread; the returned stream must stay there.
fn open_stream(
    device_name: Option<String>,
    mixer: Arc<Mixer>,
    ended_tx: mpsc::Sender<EndedFn>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_deref() == Some(name.as_str())) {
                Some(device) => {
                    info!("Using requested audio device: {}", name);
                    device
                }
                None => {
                    warn!("Device '{}' not found, falling back to default", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::AudioOutput(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
    };

    let (config, sample_format) = best_config(&device)?;
    debug!(
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        format = ?sample_format,
        "opening output stream"
    );
    mixer
        .sample_rate
        .store(config.sample_rate.0, Ordering::Relaxed);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, ended_tx)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, ended_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, ended_tx)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

/// Prefer 44.1kHz stereo; otherwise take whatever the device defaults to.
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= 44100
            && config.max_sample_rate().0 >= 44100
            && config.sample_format() == SampleFormat::F32
    });
    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        let config = config.with_sample_rate(cpal::SampleRate(44100)).config();
        return Ok((config, sample_format));
    }

    let config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = config.sample_format();
    Ok((config.config(), sample_format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mixer>,
    ended_tx: mpsc::Sender<EndedFn>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let out_rate = config.sample_rate.0 as f64;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames_out = data.len() / channels;
                scratch.clear();
                scratch.resize(frames_out * 2, 0.0);

                let clock = mixer.frames_written.load(Ordering::Relaxed) as f64 / out_rate;
                mix_voices(&mixer, &ended_tx, &mut scratch, clock, out_rate);
                mixer
                    .frames_written
                    .fetch_add(frames_out as u64, Ordering::Relaxed);

                for (frame_idx, frame) in data.chunks_mut(channels).enumerate() {
                    let left = scratch[frame_idx * 2].clamp(-1.0, 1.0);
                    let right = scratch[frame_idx * 2 + 1].clamp(-1.0, 1.0);
                    for (ch, slot) in frame.iter_mut().enumerate() {
                        let value = match (channels, ch) {
                            (1, _) => (left + right) * 0.5,
                            (_, 0) => left,
                            (_, 1) => right,
                            _ => 0.0,
                        };
                        *slot = T::from_sample(value);
                    }
                }
            },
            |e| error!("Audio stream error: {}", e),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;
    Ok(stream)
}

/// Accumulate every sounding voice into the stereo scratch buffer and
/// retire voices that stopped or ran out of samples. Finished voices'
/// callbacks are posted to the reaper, never run here.
fn mix_voices(
    mixer: &Mixer,
    ended_tx: &mpsc::Sender<EndedFn>,
    scratch: &mut [f32],
    clock: f64,
    out_rate: f64,
) {
    let frames_out = scratch.len() / 2;
    let mut voices = mixer.voices.lock().unwrap();
    voices.retain_mut(|voice| {
        if voice.ctl.stopped.load(Ordering::Acquire) {
            finish_voice(voice, ended_tx);
            return false;
        }
        let start = match *voice.ctl.start_time.lock().unwrap() {
            Some(start) => start,
            None => return true, // created but not yet scheduled
        };

        let rate = f64::from_bits(voice.ctl.rate_bits.load(Ordering::Relaxed));
        let gain = voice.gain.gain() as f32;
        let step = rate * voice.buffer.sample_rate() as f64 / out_rate;
        let samples = voice.buffer.samples();
        let frames = voice.buffer.frames();

        for frame_idx in 0..frames_out {
            let t = clock + frame_idx as f64 / out_rate;
            if t < start {
                continue;
            }
            let idx = voice.src_pos as usize;
            if idx >= frames {
                finish_voice(voice, ended_tx);
                return false;
            }
            // The final source frame has no neighbor to interpolate
            // toward; emit it as-is.
            let (left, right) = if idx + 1 >= frames {
                (samples[idx * 2], samples[idx * 2 + 1])
            } else {
                let frac = (voice.src_pos - idx as f64) as f32;
                (
                    samples[idx * 2] * (1.0 - frac) + samples[(idx + 1) * 2] * frac,
                    samples[idx * 2 + 1] * (1.0 - frac) + samples[(idx + 1) * 2 + 1] * frac,
                )
            };
            scratch[frame_idx * 2] += left * gain;
            scratch[frame_idx * 2 + 1] += right * gain;
            voice.src_pos += step;
        }
        true
    });
}

fn finish_voice(voice: &mut ActiveVoice, ended_tx: &mpsc::Sender<EndedFn>) {
    if let Some(on_ended) = voice.on_ended.take() {
        // Receiver gone means the backend is shutting down; the
        // notification is moot.
        let _ = ended_tx.send(on_ended);
    }
}
