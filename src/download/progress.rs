//! Progress events emitted by the download engine.
//!
//! Rendering is left to the observer; the engine only reports what happened.

use std::time::Duration;

use super::JobOutcome;

/// Something that happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressKind {
    /// A pool slot was acquired and the first attempt is starting.
    JobStarted,
    /// Body bytes written so far in the current attempt.
    BytesTransferred {
        downloaded: u64,
        /// Content-Length when the server sent one.
        total: Option<u64>,
    },
    /// The previous attempt failed; `attempt` starts after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// The job reached its terminal state.
    JobFinished { outcome: JobOutcome },
}

/// A progress event tagged with the job's catalog position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// 1-based catalog position of the job.
    pub position: usize,
    /// Human-readable job label.
    pub label: String,
    pub kind: ProgressKind,
}

/// Receives engine events. Called from worker tasks; must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}
