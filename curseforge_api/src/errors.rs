//! Error types for the API client.

use std::time::Duration;

/// Errors that can occur when making API requests.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The API returned a non-success status with a body snippet.
    #[error("request failed with status {status}")]
    HttpStatus {
        status: u16,
        body: String,
        /// Parsed `Retry-After` header, when the server sent one.
        retry_after: Option<Duration>,
    },
    /// The response body was larger than the configured cap.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    /// The body was read but could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),
    /// The request URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Network failures, `429` and `5xx` are transient. Everything else
    /// (rejected requests, oversized or malformed bodies) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(e) => !e.is_builder(),
            Error::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Error::BodyTooLarge { .. } | Error::Parse(_) | Error::InvalidUrl(_) => false,
        }
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
