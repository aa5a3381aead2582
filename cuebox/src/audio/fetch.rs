//! Source retrieval
//!
//! [`DefaultFetcher`] resolves URL sources over HTTP and file sources
//! from the local filesystem. Buffer sources never reach a fetcher; the
//! engine short-circuits them.

use crate::config::SoundSource;
use crate::engine::FetchService;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use tracing::debug;

pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_url(client: reqwest::Client, url: String) -> Result<Vec<u8>> {
        debug!(%url, "fetching clip");
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "Request to {} returned {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("Failed to read body from {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_file(path: PathBuf) -> Result<Vec<u8>> {
        debug!(path = %path.display(), "reading clip");
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Fetch(format!("Failed to read {}: {}", path.display(), e)))
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchService for DefaultFetcher {
    fn fetch(&self, source: &SoundSource) -> BoxFuture<'static, Result<Vec<u8>>> {
        match source {
            SoundSource::Url(url) => {
                let client = self.client.clone();
                let url = url.clone();
                Box::pin(Self::fetch_url(client, url))
            }
            SoundSource::File(path) => {
                let path = path.clone();
                Box::pin(Self::fetch_file(path))
            }
            SoundSource::Buffer(_) => Box::pin(async {
                Err(Error::Fetch(
                    "Buffer sources carry their audio inline".to_string(),
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_source_reads_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF....").unwrap();

        let fetcher = DefaultFetcher::new();
        let source = SoundSource::File(file.path().to_path_buf());
        let bytes = fetcher.fetch(&source).await.unwrap();
        assert_eq!(bytes, b"RIFF....");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_fetch_error() {
        let fetcher = DefaultFetcher::new();
        let source = SoundSource::File(PathBuf::from("/nonexistent/clip.wav"));
        assert!(matches!(
            fetcher.fetch(&source).await,
            Err(Error::Fetch(_))
        ));
    }
}
