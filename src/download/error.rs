//! Error types for the download module.
//!
//! Per-job errors never abort a run; the engine records them as a failed
//! outcome. Engine construction errors and planning errors are separate types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring one track to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt did not finish before its deadline.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error (create directory, write temp file, rename, etc.)
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The resolved play URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The body ended before the advertised Content-Length was received.
    #[error("truncated download of {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// The URL whose body was truncated.
        url: String,
        /// Content-Length advertised by the server.
        expected_bytes: u64,
        /// Bytes actually written.
        actual_bytes: u64,
    },

    /// The run was cancelled while this transfer was pending or in flight.
    #[error("cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates a network error, promoting reqwest timeouts to [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a truncated-body error.
    pub fn integrity(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Returns the Retry-After header value carried by a status error.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// Errors raised when configuring the download engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Concurrency outside the supported range.
    #[error("invalid concurrency {value}: must be between {min} and {max}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// The per-attempt timeout was zero.
    #[error("per-attempt timeout must be greater than zero")]
    ZeroTimeout,

    /// The HTTP client could not be constructed.
    #[error("failed to build download HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised while turning a resolved catalog into download jobs.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Every track was unresolved or filtered out.
    #[error(
        "no downloadable tracks: {total} in catalog, {unresolved} without a play URL, {trial_skipped} trial-only skipped"
    )]
    NoDownloadableTracks {
        /// Tracks in the catalog.
        total: usize,
        /// Tracks without a usable URL.
        unresolved: usize,
        /// Trial tracks removed by the skip-trial filter.
        trial_skipped: usize,
    },
}
