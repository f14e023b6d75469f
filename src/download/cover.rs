//! Collection cover art.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use super::constants::COVER_FILE_NAME;
use super::{DownloadError, HttpClient};

/// What [`download_cover`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverOutcome {
    Written(PathBuf),
    /// A cover file was already present and left untouched.
    AlreadyPresent(PathBuf),
}

impl CoverOutcome {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::AlreadyPresent(path) => path,
        }
    }
}

/// Saves `url` as `cover.jpg` inside `dir`. Single attempt, no retries.
///
/// # Errors
///
/// Returns transport, status or IO errors. Callers treat them as warnings.
#[instrument(level = "debug", skip(client), fields(dir = %dir.display()))]
pub async fn download_cover(
    client: &HttpClient,
    url: &str,
    dir: &Path,
) -> Result<CoverOutcome, DownloadError> {
    let path = dir.join(COVER_FILE_NAME);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        debug!(path = %path.display(), "cover already present");
        return Ok(CoverOutcome::AlreadyPresent(path));
    }

    let body = client.fetch_bytes(url).await?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::io(dir, e))?;
    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| DownloadError::io(&path, e))?;

    info!(path = %path.display(), bytes = body.len(), "cover saved");
    Ok(CoverOutcome::Written(path))
}
