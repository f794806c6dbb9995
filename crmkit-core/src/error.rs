use thiserror::Error;

/// Everything that can go wrong while talking to the API.
///
/// The `retryable` flags are decided at classification time against the
/// configured retryable status/error-code sets; the retry policy only looks
/// at [`ApiError::is_retryable`]. `Contract` marks a violated invariant on
/// our side of the wire contract and is never retried.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status without a parseable API error body.
    #[error("HTTP status {status} from `{method}`")]
    Status {
        method: String,
        status: u16,
        retryable: bool,
    },

    /// Error envelope returned by the API, either in a direct response body
    /// or in a batch item's `result_error` slot.
    #[error("API error [{code}]: {description}")]
    Api {
        code: String,
        description: String,
        retryable: bool,
    },

    /// Connection-level failure before a response could be read.
    #[error("transport failure calling `{method}`: {message}")]
    Transport {
        method: String,
        message: String,
        retryable: bool,
    },

    /// Response arrived but does not parse as a success or error envelope.
    #[error("malformed response from `{method}`: {message}")]
    Decode { method: String, message: String },

    /// Internal consistency violation: a reserved parameter supplied by the
    /// caller, a missing batch result key, an unexpected `next` offset, or a
    /// list result of an unexpected shape.
    #[error("{0}")]
    Contract(String),
}

impl ApiError {
    pub fn contract(message: impl Into<String>) -> Self {
        ApiError::Contract(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { retryable, .. }
            | ApiError::Api { retryable, .. }
            | ApiError::Transport { retryable, .. } => *retryable,
            ApiError::Decode { .. } | ApiError::Contract(_) => false,
        }
    }
}
