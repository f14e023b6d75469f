//! Playlist downloader core library.
//!
//! Resolves a playlist, album or program reference against the music
//! catalog, plans one download job per playable track, streams the audio to
//! templated paths with bounded concurrency, and can later re-match files on
//! disk to the catalog by content fingerprint.
//!
//! # Architecture
//!
//! - [`catalog`] - Reference parsing, catalog client, cache and batch resolution
//! - [`download`] - File naming, job planning, retrying download engine
//! - [`reconcile`] - Fingerprint-based renaming of existing files

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod download;
pub mod reconcile;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use catalog::{
    CatalogError, CatalogItem, CatalogResolver, NeteaseClient, PlayUrlInfo, Quality, SourceKind,
    SourceRef, Track, parse_reference,
};
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadReport, FileNamer, HttpClient,
    JobOutcome, JobPlan, RetryPolicy, plan_jobs,
};
pub use reconcile::{ReconcileReport, Reconciler};
