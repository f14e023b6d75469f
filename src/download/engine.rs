//! Bounded-concurrency download engine with retry and cancellation.
//!
//! # Concurrency Model
//!
//! - A semaphore permit is acquired *before* each job's task is spawned, so at
//!   most `concurrency` transfers exist at once and nothing else is queued
//! - Permits are released automatically when a task ends (RAII)
//! - Each job writes a private temp file next to its destination and promotes
//!   it with delete-then-rename only after the body is complete
//! - [`DownloadEngine::download_all`] returns once every task has finished
//!
//! # Retry Behavior
//!
//! Each attempt runs under its own deadline. Transient failures sleep per the
//! [`RetryPolicy`] and retry; anything else fails the job immediately. The
//! attempt count is the total number of tries, not the number of retries.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use playlist_dl_core::download::{DownloadEngine, HttpClient, NoopObserver, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(jobs: Vec<playlist_dl_core::download::DownloadJob>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(5, RetryPolicy::default(), Duration::from_secs(180))?;
//! let client = HttpClient::new()?;
//! let report = engine
//!     .download_all(jobs, &client, Arc::new(NoopObserver), &CancellationToken::new())
//!     .await;
//! println!("ok {}, skipped {}, failed {}", report.succeeded, report.skipped, report.failed);
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::progress::{ProgressEvent, ProgressKind, ProgressObserver};
use super::retry::{RetryDecision, RetryPolicy, classify_error, parse_retry_after};
use super::{DownloadError, DownloadJob, EngineError, HttpClient, JobOutcome};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default per-attempt deadline (3 minutes).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(180);

const CANCELLED_REASON: &str = "cancelled";

/// Running totals shared by every job task.
#[derive(Debug, Default)]
struct DownloadStats {
    succeeded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    /// Jobs that reached a terminal state.
    finished: AtomicUsize,
}

impl DownloadStats {
    /// Returns how many jobs have finished, this one included.
    fn record(&self, outcome: &JobOutcome) -> usize {
        let counter = match outcome {
            JobOutcome::Succeeded { .. } => &self.succeeded,
            JobOutcome::Skipped => &self.skipped,
            JobOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }
}

/// Outcome of one job, keyed by its catalog position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub position: usize,
    pub index: String,
    pub track_id: u64,
    pub label: String,
    pub target_path: PathBuf,
    pub outcome: JobOutcome,
}

/// Aggregate result of [`DownloadEngine::download_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Retry sleeps taken across all jobs.
    pub retried: usize,
    /// One entry per job, sorted by catalog position.
    pub results: Vec<JobResult>,
}

impl DownloadReport {
    /// Jobs that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// Returns true when at least one job failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Results of failed jobs.
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.outcome.is_failed())
    }
}

/// Identity of a job kept outside its task so a panic still yields a result.
struct JobMeta {
    position: usize,
    index: String,
    track_id: u64,
    label: String,
    target_path: PathBuf,
}

impl JobMeta {
    fn of(job: &DownloadJob) -> Self {
        Self {
            position: job.position(),
            index: job.index().to_string(),
            track_id: job.track().id,
            label: job.label(),
            target_path: job.target_path().to_path_buf(),
        }
    }

    fn into_result(self, outcome: JobOutcome) -> JobResult {
        JobResult {
            position: self.position,
            index: self.index,
            track_id: self.track_id,
            label: self.label,
            target_path: self.target_path,
            outcome,
        }
    }
}

/// Settings each task needs, cloned once per job.
#[derive(Clone)]
struct JobContext {
    client: HttpClient,
    retry_policy: RetryPolicy,
    attempt_timeout: Duration,
    skip_existing: bool,
    observer: Arc<dyn ProgressObserver>,
    stats: Arc<DownloadStats>,
    total_jobs: usize,
    cancel: CancellationToken,
}

impl JobContext {
    fn emit(&self, job: &DownloadJob, kind: ProgressKind) {
        self.observer.on_event(ProgressEvent {
            position: job.position(),
            label: job.label(),
            kind,
        });
    }
}

/// Download engine for concurrent track downloads.
#[derive(Debug)]
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    attempt_timeout: Duration,
    skip_existing: bool,
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum simultaneous transfers (1-100)
    /// * `retry_policy` - Attempt budget and backoff
    /// * `attempt_timeout` - Deadline applied to each attempt independently
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1-100 and
    /// [`EngineError::ZeroTimeout`] for a zero deadline.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }
        if attempt_timeout.is_zero() {
            return Err(EngineError::ZeroTimeout);
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            attempt_timeout_secs = attempt_timeout.as_secs(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            attempt_timeout,
            skip_existing: true,
        })
    }

    /// Whether a non-empty file at the destination skips the job (default true).
    #[must_use]
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads every job and returns the aggregate report.
    ///
    /// Individual failures never make this fail. When `cancel` fires, jobs
    /// still waiting for a slot and jobs in flight end as failed
    /// ("cancelled") and their temp files are removed.
    #[instrument(skip_all, fields(jobs = jobs.len(), concurrency = self.concurrency))]
    pub async fn download_all(
        &self,
        jobs: Vec<DownloadJob>,
        client: &HttpClient,
        observer: Arc<dyn ProgressObserver>,
        cancel: &CancellationToken,
    ) -> DownloadReport {
        let stats = Arc::new(DownloadStats::default());
        let ctx = JobContext {
            client: client.clone(),
            retry_policy: self.retry_policy.clone(),
            attempt_timeout: self.attempt_timeout,
            skip_existing: self.skip_existing,
            observer,
            stats: Arc::clone(&stats),
            total_jobs: jobs.len(),
            cancel: cancel.clone(),
        };

        info!("starting downloads");

        let mut handles = Vec::with_capacity(jobs.len());
        let mut results = Vec::with_capacity(jobs.len());
        let mut pending = jobs.into_iter();

        while let Some(job) = pending.next() {
            // Blocks while the pool is saturated.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                for job in std::iter::once(job).chain(pending.by_ref()) {
                    results.push(cancel_unstarted(&ctx, &job));
                }
                break;
            };

            let meta = JobMeta::of(&job);
            let ctx = ctx.clone();
            handles.push((
                meta,
                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(&ctx, &job).await
                }),
            ));
        }

        for (meta, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(position = meta.position, error = %join_error, "download task aborted");
                    let outcome = JobOutcome::Failed {
                        reason: format!("task aborted: {join_error}"),
                        attempts: 0,
                    };
                    stats.record(&outcome);
                    outcome
                }
            };
            results.push(meta.into_result(outcome));
        }

        results.sort_by_key(|r| r.position);
        debug_assert_eq!(stats.finished(), results.len());
        let report = DownloadReport {
            succeeded: stats.succeeded.load(Ordering::SeqCst),
            skipped: stats.skipped.load(Ordering::SeqCst),
            failed: stats.failed.load(Ordering::SeqCst),
            retried: stats.retried.load(Ordering::SeqCst),
            results,
        };

        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            retried = report.retried,
            "downloads finished"
        );
        report
    }
}

fn cancel_unstarted(ctx: &JobContext, job: &DownloadJob) -> JobResult {
    let outcome = JobOutcome::Failed {
        reason: CANCELLED_REASON.to_string(),
        attempts: 0,
    };
    finish(ctx, job, outcome.clone());
    JobMeta::of(job).into_result(outcome)
}

fn finish(ctx: &JobContext, job: &DownloadJob, outcome: JobOutcome) -> JobOutcome {
    let done = ctx.stats.record(&outcome);
    debug!(done, total = ctx.total_jobs, "job finished");
    ctx.emit(
        job,
        ProgressKind::JobFinished {
            outcome: outcome.clone(),
        },
    );
    outcome
}

/// Runs one job to a terminal outcome.
#[instrument(skip_all, fields(position = job.position(), track_id = job.track().id))]
async fn run_job(ctx: &JobContext, job: &DownloadJob) -> JobOutcome {
    ctx.emit(job, ProgressKind::JobStarted);
    let target = job.target_path();

    if ctx.skip_existing && is_non_empty_file(target).await {
        debug!(path = %target.display(), "destination exists, skipping");
        return finish(ctx, job, JobOutcome::Skipped);
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        let error = DownloadError::io(parent, e);
        warn!(error = %error, "cannot create destination directory");
        return finish(
            ctx,
            job,
            JobOutcome::Failed {
                reason: error.to_string(),
                attempts: 0,
            },
        );
    }

    let temp = temp_path(target, job.track().id, job.index());
    let outcome = attempt_loop(ctx, job, &temp).await;
    if let JobOutcome::Succeeded { bytes, .. } = &outcome {
        info!(path = %target.display(), bytes, "download complete");
    }
    finish(ctx, job, outcome)
}

async fn attempt_loop(ctx: &JobContext, job: &DownloadJob, temp: &Path) -> JobOutcome {
    let url = job.url();
    let mut attempt = 1;

    loop {
        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(DownloadError::Cancelled),
            timed = tokio::time::timeout(
                ctx.attempt_timeout,
                ctx.client.fetch_to_file(url, temp, |downloaded, total| {
                    ctx.emit(job, ProgressKind::BytesTransferred { downloaded, total });
                }),
            ) => timed.unwrap_or_else(|_| Err(DownloadError::timeout(url))),
        };

        let error = match result {
            Ok(bytes) => match promote(temp, job.target_path()).await {
                Ok(()) => {
                    return JobOutcome::Succeeded {
                        bytes,
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            },
            Err(error) => error,
        };

        discard(temp).await;

        if matches!(error, DownloadError::Cancelled) {
            return JobOutcome::Failed {
                reason: CANCELLED_REASON.to_string(),
                attempts: attempt,
            };
        }

        let hint = error.retry_after().and_then(parse_retry_after);
        match ctx
            .retry_policy
            .should_retry_with_hint(classify_error(&error), attempt, hint)
        {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "download attempt failed, retrying"
                );
                ctx.stats.increment_retried();
                ctx.emit(
                    job,
                    ProgressKind::Retrying {
                        attempt: next,
                        delay,
                    },
                );
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => {
                        return JobOutcome::Failed {
                            reason: CANCELLED_REASON.to_string(),
                            attempts: attempt,
                        };
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(attempt, error = %error, %reason, "download failed");
                return JobOutcome::Failed {
                    reason: error.to_string(),
                    attempts: attempt,
                };
            }
        }
    }
}

/// `<dir>/.<track id>.<index>.part`
///
/// Independent of the destination's name, which may already be at the
/// file-system name limit.
fn temp_path(target: &Path, track_id: u64, index: &str) -> PathBuf {
    target.with_file_name(format!(".{track_id}.{index}.part"))
}

async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Replaces `target` with `temp` (delete, then rename).
///
/// Not atomic: a crash between the two steps leaves no file at `target`.
async fn promote(temp: &Path, target: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(target).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::io(target, e)),
    }
    tokio::fs::rename(temp, target)
        .await
        .map_err(|e| DownloadError::io(target, e))
}

async fn discard(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => debug!(path = %temp.display(), "removed partial file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "failed to remove partial file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_rejects_out_of_range_concurrency() {
        for value in [0, 101] {
            let err = DownloadEngine::new(value, RetryPolicy::default(), DEFAULT_ATTEMPT_TIMEOUT)
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidConcurrency { .. }));
        }
        assert!(DownloadEngine::new(1, RetryPolicy::default(), DEFAULT_ATTEMPT_TIMEOUT).is_ok());
        assert!(DownloadEngine::new(100, RetryPolicy::default(), DEFAULT_ATTEMPT_TIMEOUT).is_ok());
    }

    #[test]
    fn test_engine_rejects_zero_timeout() {
        let err = DownloadEngine::new(5, RetryPolicy::default(), Duration::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::ZeroTimeout));
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path(Path::new("out/Mix/Singer - Song.mp3"), 4242, "07");
        assert_eq!(temp, Path::new("out/Mix/.4242.07.part"));
    }

    #[test]
    fn test_stats_record_counts_finished() {
        let stats = DownloadStats::default();
        stats.record(&JobOutcome::Skipped);
        stats.record(&JobOutcome::Failed {
            reason: "x".to_string(),
            attempts: 1,
        });
        assert_eq!(stats.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(stats.failed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.finished(), 2);
    }

    #[tokio::test]
    async fn test_promote_replaces_existing_destination() {
        let dir = tempfile::TempDir::new().unwrap();
        let temp = dir.path().join(".a.mp3.1.part");
        let target = dir.path().join("a.mp3");
        std::fs::write(&temp, b"new").unwrap();
        std::fs::write(&target, b"old").unwrap();

        promote(&temp, &target).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!temp.exists());
    }
}
