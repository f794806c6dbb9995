use std::time::Duration;

use crate::retry::RetryPolicy;

/// HTTP statuses worth another attempt: locked, too-early, throttled, and
/// the transient 5xx family the API is known to emit under load.
pub const DEFAULT_RETRY_STATUSES: [u16; 7] = [423, 425, 429, 500, 502, 503, 507];

/// API error codes the server documents as transient.
pub const DEFAULT_RETRY_ERRORS: [&str; 2] = ["query_limit_exceeded", "operation_time_limit"];

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Caller-specific HTTPS origin+path prefix all methods are invoked
    /// under, e.g. `https://example.bitrix24.com/rest/1/abc123/`.
    pub webhook_url: String,
    /// HTTP statuses that trigger a retry.
    pub retry_statuses: Vec<u16>,
    /// API error codes (lower-cased) that trigger a retry.
    pub retry_errors: Vec<String>,
    /// Total attempts per logical call, first one included.
    pub retry_tries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after every retry.
    pub retry_backoff: f64,
    /// Server-side page size of `*.list` methods.
    pub list_size: usize,
    /// Maximum number of commands per composite `batch` call.
    pub batch_size: usize,
    /// Numeric identifier field used by the cursor-range strategies.
    pub id_key: String,
    /// Per-request timeout of the underlying HTTP client.
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        ApiConfig {
            webhook_url: webhook_url.into(),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            retry_errors: DEFAULT_RETRY_ERRORS.iter().map(|s| s.to_string()).collect(),
            retry_tries: 5,
            retry_delay: Duration::from_secs(5),
            retry_backoff: 2.0,
            list_size: 50,
            batch_size: 50,
            id_key: "ID".into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            tries: self.retry_tries,
            delay: self.retry_delay,
            backoff: self.retry_backoff,
        }
    }
}
