//! HTTP client wrapper for streaming audio and cover art to disk.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::{DownloadError, EngineError};
use crate::user_agent;

/// HTTP client for downloading files with streaming support.
///
/// Created once per run and shared by every job, so connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts (30 s connect, 5 min between reads).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .map_err(|source| EngineError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Streams `url` into a newly created file at `dest`.
    ///
    /// `on_progress` receives `(bytes_written, content_length)` after every
    /// chunk. The caller owns `dest` and must remove it on error.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Integrity`] when the body is shorter or longer
    /// than the advertised Content-Length, plus the usual transport, status and
    /// IO errors.
    #[instrument(level = "debug", skip(self, on_progress), fields(dest = %dest.display()))]
    pub async fn fetch_to_file<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let response = self.send(url).await?;
        let content_length = response.content_length();

        let file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        on_progress(0, content_length);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
            written += chunk.len() as u64;
            on_progress(written, content_length);
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        if let Some(expected) = content_length
            && expected != written
        {
            return Err(DownloadError::integrity(url, expected, written));
        }

        debug!(bytes = written, "body streamed");
        Ok(written)
    }

    /// Fetches a small body fully into memory.
    ///
    /// # Errors
    ///
    /// Returns transport or status errors.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.send(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        Ok(body.to_vec())
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }
        Ok(response)
    }
}
