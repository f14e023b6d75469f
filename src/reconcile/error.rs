//! Error types for the reconcile pass.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a reconcile pass before any file is touched.
///
/// Per-file problems (unreadable file, failed rename) are logged and counted
/// in the report instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The directory to reconcile does not exist or is not a directory.
    #[error("reconcile root {path} is not a directory")]
    NotADirectory {
        /// The rejected path.
        path: PathBuf,
    },

    /// Walking the directory tree failed at its root.
    #[error("cannot scan {path}: {source}")]
    Scan {
        /// The directory being scanned.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },
}

impl ReconcileError {
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    pub fn scan(path: impl Into<PathBuf>, source: walkdir::Error) -> Self {
        Self::Scan {
            path: path.into(),
            source,
        }
    }
}
