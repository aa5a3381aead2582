//! Clip decoding via symphonia
//!
//! Decodes a complete encoded clip (MP3, FLAC, AAC, M4A, Vorbis, WAV per
//! the Cargo.toml feature set) into interleaved stereo f32. Short clips
//! are decoded whole; there is no streaming path.
//!
//! Channel handling: mono is duplicated to both sides, stereo passes
//! through, more than two channels are averaged down (even-indexed
//! channels to the left, odd to the right).

use crate::audio::types::DecodedAudio;
use crate::engine::DecodeService;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode a complete clip from its encoded bytes.
pub fn decode_clip(data: Vec<u8>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("Unrecognized audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Stream does not declare a sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skippable; the clip decodes around it.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(Error::Decode(format!("Failed to decode packet: {}", e))),
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        let needs_alloc = match sample_buf.as_ref() {
            Some(buf) => buf.capacity() < decoded.capacity() * spec.channels.count(),
            None => true,
        };
        if needs_alloc {
            sample_buf = Some(SampleBuffer::new(capacity, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            append_stereo(buf.samples(), spec.channels.count(), &mut samples);
        }
    }

    if samples.is_empty() {
        return Err(Error::Decode("Clip contains no audio data".to_string()));
    }

    DecodedAudio::new(samples, sample_rate)
}

/// Fold `channels`-interleaved samples into the stereo output vector.
fn append_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            out.reserve(interleaved.len() * 2);
            for &sample in interleaved {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            let frames = interleaved.len() / channels;
            out.reserve(frames * 2);
            let half = (channels as f32) / 2.0;
            for frame in interleaved.chunks_exact(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (idx, &sample) in frame.iter().enumerate() {
                    if idx % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                out.push(left / half);
                out.push(right / half);
            }
        }
    }
}

/// [`DecodeService`] backed by symphonia, running decodes on the
/// blocking thread pool.
#[derive(Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl DecodeService for SymphoniaDecoder {
    fn decode(&self, data: Vec<u8>) -> BoxFuture<'static, Result<DecodedAudio>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || decode_clip(data))
                .await
                .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))?
        })
    }
}
