//! Turning resolved tracks into files on disk.
//!
//! # Features
//!
//! - Template-driven file naming with cross-platform sanitization
//! - Bounded-concurrency streaming downloads (memory-efficient for large files)
//! - Per-attempt deadlines with exponential backoff on transient failures
//! - Temp-file writes promoted only after the full body arrived
//! - Cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::path::Path;
//! use std::sync::Arc;
//! use playlist_dl_core::catalog::CatalogItem;
//! use playlist_dl_core::download::{
//!     DEFAULT_ATTEMPT_TIMEOUT, DownloadEngine, FileNamer, HttpClient, NoopObserver, RetryPolicy,
//!     plan_jobs,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(catalog: CatalogItem, urls: HashMap<u64, playlist_dl_core::catalog::PlayUrlInfo>) -> Result<(), Box<dyn std::error::Error>> {
//! let plan = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("./music"), false)?;
//! let engine = DownloadEngine::new(5, RetryPolicy::default(), DEFAULT_ATTEMPT_TIMEOUT)?;
//! let report = engine
//!     .download_all(plan.jobs, &HttpClient::new()?, Arc::new(NoopObserver), &CancellationToken::new())
//!     .await;
//! println!("{} failed", report.failed);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod cover;
mod engine;
mod error;
mod filename;
mod job;
mod progress;
mod retry;

pub use client::HttpClient;
pub use constants::{COVER_FILE_NAME, MAX_RETRY_AFTER};
pub use cover::{CoverOutcome, download_cover};
pub use engine::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_CONCURRENCY, DownloadEngine, DownloadReport, JobResult,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use error::{DownloadError, EngineError, PlanError};
pub use filename::{
    AudioExtension, DEFAULT_TEMPLATE, FileNamer, MAX_PATH_CHARS, MAX_SEGMENT_CHARS, NamingContext,
    format_index, index_width, sanitize_field,
};
pub use job::{DownloadJob, JobOutcome, JobPlan, plan_jobs};
pub use progress::{NoopObserver, ProgressEvent, ProgressKind, ProgressObserver};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_http_status, parse_retry_after,
};
