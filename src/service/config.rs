//! Service configuration constants

use std::time::Duration;

use super::rate_limit::RateLimit;

/// Quota assumed for the web API until the server says otherwise.
/// Mirrors the published client policy: 45 calls per minute with a
/// 240 calls per 4 minutes safety net.
pub const DEFAULT_API_RATE_LIMITS: [RateLimit; 2] =
    [RateLimit::from_secs(45, 60), RateLimit::from_secs(240, 240)];

/// Consecutive rejections tolerated before a call is given up on.
pub const MAX_REJECTION_RETRIES: u32 = 5;

/// Cool-off waits longer than this are logged at info level.
pub const COOL_OFF_LOG_THRESHOLD: Duration = Duration::from_secs(1);

/// Cooldown used when a 429 response carries no usable Retry-After.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP connect timeout - time to establish the TCP connection
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP request timeout - overall time for the entire request
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-worker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Rejections in a row after which the rejected call is dropped.
    /// `None` retries for as long as the server keeps rejecting.
    pub max_rejection_retries: Option<u32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_rejection_retries: Some(MAX_REJECTION_RETRIES),
        }
    }
}

impl WorkerConfig {
    /// Retry rejected calls without limit
    pub fn unbounded() -> Self {
        Self {
            max_rejection_retries: None,
        }
    }

    /// Whether a call rejected `streak` times in a row should be retried again
    pub fn allows_retry(&self, streak: u32) -> bool {
        self.max_rejection_retries
            .map_or(true, |max| streak <= max)
    }
}
