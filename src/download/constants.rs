//! Constants for the download module (timeouts, limits).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout between body chunks (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum honored Retry-After value (1 hour).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// File name used for collection cover art.
pub const COVER_FILE_NAME: &str = "cover.jpg";
