use std::time::Duration;
use thiserror::Error;

/// Failures of the durable conversation store. Recovered locally: loads degrade
/// to an empty list and failed saves leave the in-memory state untouched.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend unavailable: {0}")]
    Backend(String),
    #[error("stored conversations are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Failures of a completion request. These never escape the controller; they are
/// turned into an apology message in the transcript.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion client misconfigured: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{reason} (HTTP {status}): {details}")]
    Status {
        status: u16,
        reason: &'static str,
        details: String,
    },
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::MalformedResponse(err.to_string())
        } else {
            CompletionError::Network(err.to_string())
        }
    }
}

/// Errors returned to the caller of a controller operation. Validation errors are
/// raised before any state is touched.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("title is empty")]
    EmptyTitle,
    #[error("a reply is still pending")]
    ReplyPending,
    #[error("conversation '{0}' not found")]
    NotFound(String),
    #[error("reply does not belong to the pending request")]
    StaleReply,
}

/// Human-readable reason for an unsuccessful HTTP status.
pub fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "invalid request",
        401 => "invalid API key",
        429 => "rate limit exceeded",
        s if s >= 500 => "upstream server error",
        _ => "API error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reasons_follow_upstream_codes() {
        assert_eq!(describe_status(401), "invalid API key");
        assert_eq!(describe_status(429), "rate limit exceeded");
        assert_eq!(describe_status(400), "invalid request");
        assert_eq!(describe_status(503), "upstream server error");
        assert_eq!(describe_status(404), "API error");
    }

    #[test]
    fn status_error_renders_reason_and_code() {
        let err = CompletionError::Status {
            status: 429,
            reason: describe_status(429),
            details: "slow down".into(),
        };
        assert_eq!(err.to_string(), "rate limit exceeded (HTTP 429): slow down");
    }
}
