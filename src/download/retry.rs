//! Retry state machine with exponential backoff.
//!
//! Failures are classified into a [`FailureType`]; [`RetryPolicy`] then
//! decides, from the failure type and the attempt that just failed, whether
//! another attempt is made and how long to sleep first.
//!
//! The delay after failed attempt `k` (1-indexed) is
//! `min(base_delay * multiplier^(k-1), max_delay)`, optionally raised to a
//! server-provided Retry-After value and optionally widened by random jitter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use playlist_dl_core::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://cdn.example.com/a.mp3", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(1));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("{reason}"),
//! }
//! ```

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::DownloadError;
use super::constants::MAX_RETRY_AFTER;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Catalog API calls back off from 2 s (2 s, 4 s, ...).
const CATALOG_BASE_DELAY: Duration = Duration::from_secs(2);
const CATALOG_MAX_JITTER: Duration = Duration::from_millis(250);

/// Classification of a failure for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection reset, timeout, 5xx, truncated body.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404, invalid URL, local disk errors, cancellation.
    Permanent,

    /// The server requires credentials (401/403); retrying without a
    /// valid cookie would not help.
    NeedsAuth,

    /// Server rate limiting (HTTP 429). Retried, honoring Retry-After.
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Number of the attempt about to be made (1-indexed, so the first retry is 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Exponential backoff configuration.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: none
///
/// With defaults, the sleeps before attempts 2 and 3 are exactly 1 s and 2 s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay after the first failed attempt.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied per failed attempt.
    backoff_multiplier: f32,

    /// Upper bound of the random jitter added to each delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings and no jitter.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Delay after the first failure
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: Duration::ZERO,
        }
    }

    /// Creates a policy with a custom attempt count, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy used for catalog API calls: 3 attempts, 2 s then 4 s, up to 250 ms jitter.
    #[must_use]
    pub fn catalog() -> Self {
        Self {
            base_delay: CATALOG_BASE_DELAY,
            max_jitter: CATALOG_MAX_JITTER,
            ..Self::default()
        }
    }

    /// Adds up to `max_jitter` of random delay to every retry.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        self.should_retry_with_hint(failure_type, attempt, None)
    }

    /// Like [`RetryPolicy::should_retry`], but a rate-limited failure waits at
    /// least `retry_after` (capped at one hour).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry_with_hint(
        &self,
        failure_type: FailureType,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication required - check the cookie file".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let mut delay = self.calculate_delay(attempt);
        if failure_type == FailureType::RateLimited {
            if let Some(hint) = retry_after {
                delay = delay.max(hint.min(MAX_RETRY_AFTER));
            }
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff for the failed `attempt`, plus jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1).min(62)).unwrap_or(62);
        let secs = self.base_delay.as_secs_f64()
            * f64::from(self.backoff_multiplier).powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let delay = Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay);

        delay + self.calculate_jitter()
    }

    /// Random jitter in `0..=max_jitter`.
    fn calculate_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Network, Timeout | Transient |
/// | Integrity (truncated body) | Transient |
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | HTTP 401, 403 | NeedsAuth |
/// | other HTTP | Permanent |
/// | Io, InvalidUrl, Cancelled | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::Integrity { .. } => FailureType::Transient,
        DownloadError::Io { .. } | DownloadError::InvalidUrl { .. } | DownloadError::Cancelled => {
            FailureType::Permanent
        }
    }
}

/// Classifies an HTTP status code into a failure type.
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 | 403 => FailureType::NeedsAuth,
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Parses a Retry-After header as delta-seconds or an HTTP-date.
///
/// Negative or unparseable values yield `None`; dates in the past yield zero.
/// Values above one hour are capped.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(when) => Some(
            when.duration_since(SystemTime::now())
                .map_or(Duration::ZERO, cap_retry_after),
        ),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}

fn cap_retry_after(delay: Duration) -> Duration {
    if delay > MAX_RETRY_AFTER {
        warn!(
            delay_secs = delay.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        MAX_RETRY_AFTER
    } else {
        delay
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert!((policy.backoff_multiplier - 2.0).abs() < f32::EPSILON);
        assert_eq!(policy.max_jitter, Duration::ZERO);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0).max_attempts(), 1);
    }

    #[test]
    fn test_default_delays_are_one_then_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
        assert_eq!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 3
            }
        );
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_attempt_number_does_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.calculate_delay(u32::MAX - 1), Duration::from_secs(5));
    }

    #[test]
    fn test_catalog_policy_delays_with_jitter() {
        let policy = RetryPolicy::catalog();
        for _ in 0..50 {
            let first = policy.calculate_delay(1);
            assert!(first >= Duration::from_secs(2));
            assert!(first <= Duration::from_millis(2250));
            let second = policy.calculate_delay(2);
            assert!(second >= Duration::from_secs(4));
            assert!(second <= Duration::from_millis(4250));
        }
    }

    // ==================== Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("permanent")));
    }

    #[test]
    fn test_should_retry_needs_auth_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::NeedsAuth, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("cookie")));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { .. }
        ));
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("exhausted")));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let decision = RetryPolicy::with_max_attempts(1).should_retry(FailureType::Transient, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn test_rate_limited_honors_longer_retry_after() {
        let policy = RetryPolicy::default();
        let decision =
            policy.should_retry_with_hint(FailureType::RateLimited, 1, Some(Duration::from_secs(7)));
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_secs(7),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_retry_after_hint_ignored_for_transient() {
        let policy = RetryPolicy::default();
        let decision =
            policy.should_retry_with_hint(FailureType::Transient, 1, Some(Duration::from_secs(7)));
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_http_statuses() {
        let cases = [
            (400, FailureType::Permanent),
            (401, FailureType::NeedsAuth),
            (403, FailureType::NeedsAuth),
            (404, FailureType::Permanent),
            (408, FailureType::Transient),
            (429, FailureType::RateLimited),
            (500, FailureType::Transient),
            (503, FailureType::Transient),
            (302, FailureType::Permanent),
        ];
        for (status, expected) in cases {
            let error = DownloadError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), expected, "status {status}");
        }
    }

    #[test]
    fn test_classify_non_http_errors() {
        assert_eq!(
            classify_error(&DownloadError::timeout("u")),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::integrity("u", 10, 3)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Permanent
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            classify_error(&DownloadError::io("/x", io)),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::Cancelled),
            FailureType::Permanent
        );
    }

    // ==================== Retry-After Parsing ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        assert_eq!(
            parse_retry_after("Sun, 06 Nov 1994 08:49:37 GMT"),
            Some(Duration::ZERO)
        );
    }
}
