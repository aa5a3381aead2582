//! Sound engine
//!
//! [`SoundEngine`] is the crate's entry point. It owns the audio backend
//! and the load pipeline, and mints [`Sound`] facades. Creation is
//! non-blocking: a buffer-backed sound is ready on return, while URL and
//! file sources resolve on a spawned task and flip the facade to ready
//! (or failed) when fetch and decode complete.

use crate::audio::types::DecodedAudio;
use crate::backend::AudioBackend;
use crate::config::{SoundConfig, SoundSource};
use crate::error::Result;
use crate::sound::Sound;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// Retrieves the encoded bytes behind a sound source.
///
/// The default implementation handles HTTP URLs and local files; tests
/// substitute an in-memory one.
pub trait FetchService: Send + Sync {
    fn fetch(&self, source: &SoundSource) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Turns encoded bytes into interleaved stereo samples.
pub trait DecodeService: Send + Sync {
    fn decode(&self, data: Vec<u8>) -> BoxFuture<'static, Result<DecodedAudio>>;
}

pub struct SoundEngine {
    backend: Arc<dyn AudioBackend>,
    fetcher: Arc<dyn FetchService>,
    decoder: Arc<dyn DecodeService>,
}

impl SoundEngine {
    /// Engine with the default fetch and decode services.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self::with_services(
            backend,
            Arc::new(crate::audio::fetch::DefaultFetcher::new()),
            Arc::new(crate::audio::decode::SymphoniaDecoder::new()),
        )
    }

    /// Engine with caller-supplied services.
    pub fn with_services(
        backend: Arc<dyn AudioBackend>,
        fetcher: Arc<dyn FetchService>,
        decoder: Arc<dyn DecodeService>,
    ) -> Self {
        Self {
            backend,
            fetcher,
            decoder,
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    /// Create a sound from `config`.
    ///
    /// Structural problems with the config (empty source, zero
    /// concurrency, non-finite volume or rate) fail fast here. Fetch and
    /// decode failures are reported later through the facade's error
    /// callback, never as a panic.
    ///
    /// URL and file sources require a running tokio runtime; buffer
    /// sources do not.
    pub fn create_sound(&self, config: SoundConfig) -> Result<Sound> {
        config.validate()?;

        let source = config.source.clone();
        let (sound, shared) = Sound::create(Arc::clone(&self.backend), config);
        debug!(sound_id = %sound.id(), sound_type = %sound.sound_type(), "creating sound");

        match source {
            SoundSource::Buffer(buffer) => {
                shared.finish_load(Ok(buffer));
            }
            source => {
                let fetcher = Arc::clone(&self.fetcher);
                let decoder = Arc::clone(&self.decoder);
                let weak = Arc::downgrade(&shared);
                tokio::spawn(async move {
                    let result = async {
                        let data = fetcher.fetch(&source).await?;
                        let audio = decoder.decode(data).await?;
                        Ok(audio.into_shared())
                    }
                    .await;
                    match weak.upgrade() {
                        Some(shared) => shared.finish_load(result),
                        None => debug!("sound dropped before its load completed"),
                    }
                });
            }
        }
        Ok(sound)
    }
}

impl std::fmt::Debug for SoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::SoundType;
    use crate::error::Error;
    use std::time::Duration;

    struct StubFetcher {
        result: std::result::Result<Vec<u8>, String>,
    }

    impl FetchService for StubFetcher {
        fn fetch(&self, _source: &SoundSource) -> BoxFuture<'static, Result<Vec<u8>>> {
            let result = self
                .result
                .clone()
                .map_err(Error::Fetch);
            Box::pin(async move { result })
        }
    }

    struct StubDecoder;

    impl DecodeService for StubDecoder {
        fn decode(&self, _data: Vec<u8>) -> BoxFuture<'static, Result<DecodedAudio>> {
            Box::pin(async move { DecodedAudio::silence(0.25, 44100) })
        }
    }

    fn stub_engine(fetch: std::result::Result<Vec<u8>, String>) -> SoundEngine {
        SoundEngine::with_services(
            Arc::new(MockBackend::new()),
            Arc::new(StubFetcher { result: fetch }),
            Arc::new(StubDecoder),
        )
    }

    #[test]
    fn test_buffer_source_is_ready_on_return() {
        let engine = SoundEngine::with_services(
            Arc::new(MockBackend::new()),
            Arc::new(StubFetcher {
                result: Ok(Vec::new()),
            }),
            Arc::new(StubDecoder),
        );
        let buffer = DecodedAudio::silence(1.0, 44100).unwrap().into_shared();
        let config = SoundConfig::new(SoundSource::Buffer(buffer), SoundType::Multishot);
        let sound = engine.create_sound(config).unwrap();
        assert!(sound.is_ready());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let engine = stub_engine(Ok(Vec::new()));
        let config = SoundConfig::new(
            SoundSource::Url(String::new()),
            SoundType::Multishot,
        );
        assert!(matches!(
            engine.create_sound(config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_url_source_loads_asynchronously() {
        let engine = stub_engine(Ok(vec![0u8; 16]));
        let (tx, rx) = std::sync::mpsc::channel();
        let mut config = SoundConfig::new(
            SoundSource::Url("http://example.com/clip.wav".to_string()),
            SoundType::Multishot,
        );
        config.callbacks.on_load = Some(Box::new(move || {
            let _ = tx.send(());
        }));

        let sound = engine.create_sound(config).unwrap();
        tokio::task::spawn_blocking(move || {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        })
        .await
        .unwrap();
        assert!(sound.is_ready());
        assert!((sound.duration() - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fetch_failure_reaches_error_callback() {
        let engine = stub_engine(Err("connection refused".to_string()));
        let (tx, rx) = std::sync::mpsc::channel();
        let mut config = SoundConfig::new(
            SoundSource::Url("http://example.com/missing.wav".to_string()),
            SoundType::Loop,
        );
        config.callbacks.on_error = Some(Box::new(move |error| {
            let _ = tx.send(error.to_string());
        }));

        let sound = engine.create_sound(config).unwrap();
        let message = tokio::task::spawn_blocking(move || {
            rx.recv_timeout(Duration::from_secs(5)).unwrap()
        })
        .await
        .unwrap();
        assert!(message.contains("connection refused"));
        assert!(!sound.is_ready());
        sound.play(); // must remain a safe no-op
    }
}
