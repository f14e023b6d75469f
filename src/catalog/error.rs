//! Error types for catalog resolution.
//!
//! Reference errors are fatal for a run. Transport errors are retried inside
//! the catalog client and then surface to the resolver, which degrades them to
//! "missing" data. Malformed entries are values, not errors: they are collected
//! per batch and logged.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::download::{FailureType, classify_http_status};

/// Errors that can occur while resolving a catalog reference.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The input matches none of the supported reference shapes.
    #[error(
        "unrecognized reference '{input}'\n  Suggestion: pass a playlist/album/radio URL or a numeric playlist id"
    )]
    UnrecognizedReference {
        /// The raw reference string.
        input: String,
    },

    /// The reference kind was recognized but no numeric id could be extracted.
    #[error("no catalog id found in '{input}'")]
    IdNotFound {
        /// The raw reference string.
        input: String,
    },

    /// Network-level failure talking to the catalog API.
    #[error("network error calling {url}: {source}")]
    Network {
        /// The request URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The catalog API did not answer in time.
    #[error("timeout calling {url}")]
    Timeout {
        /// The request URL.
        url: String,
    },

    /// Non-success HTTP status from the catalog API.
    #[error("HTTP {status} calling {url}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// The response body could not be decoded at all.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The request URL.
        url: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// The cookie file exists but could not be read.
    #[error("failed to read cookie file {path}: {source}")]
    CookieFile {
        /// The cookie file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configured API base URL is not a valid absolute URL.
    #[error("invalid catalog API base URL '{url}'")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build catalog HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl CatalogError {
    /// Creates an `UnrecognizedReference` error.
    pub fn unrecognized(input: impl Into<String>) -> Self {
        Self::UnrecognizedReference {
            input: input.into(),
        }
    }

    /// Creates an `IdNotFound` error.
    pub fn id_not_found(input: impl Into<String>) -> Self {
        Self::IdNotFound {
            input: input.into(),
        }
    }

    /// Creates a network error, promoting reqwest timeouts to [`CatalogError::Timeout`].
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
    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Classifies this error for the retry state machine.
    ///
    /// Rate limiting and transient transport failures are retried; reference
    /// errors, undecodable bodies and other 4xx responses are not.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => FailureType::Transient,
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            _ => FailureType::Permanent,
        }
    }

    /// Returns the Retry-After header value carried by a rate-limited response.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// A catalog entry that could not be decoded and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMetadata {
    /// What kind of entry was being decoded ("track", "play url", ...).
    pub entity: &'static str,
    /// The entry id when it could be read.
    pub id: Option<u64>,
    /// Which field was missing or invalid.
    pub reason: String,
}

impl MalformedMetadata {
    /// Creates a malformed-entry record.
    pub fn new(entity: &'static str, id: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            entity,
            id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "malformed {} {id}: {}", self.entity, self.reason),
            None => write!(f, "malformed {}: {}", self.entity, self.reason),
        }
    }
}
