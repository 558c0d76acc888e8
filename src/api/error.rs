use thiserror::Error;

/// Why a single network attempt failed. Every variant is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Transport(String),

    /// Non-success status other than 429; `message` comes from the body's
    /// `error` field when present
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Success status, but the body did not decode into the expected shape
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        AttemptError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AttemptError {
    fn from(err: serde_json::Error) -> Self {
        AttemptError::Decode(err.to_string())
    }
}

/// Failure surfaced to callers of the executor, aggregator and accessors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    #[error("Still rate limited after {waits} consecutive waits")]
    RateLimitExceeded { waits: u32 },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// The last attempt's error, if the fetch got that far
    pub fn last_attempt_error(&self) -> Option<&AttemptError> {
        match self {
            FetchError::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}
