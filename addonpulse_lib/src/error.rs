//! Error types for the library layer.

use std::fmt;

use crate::db::DbError;

/// Outcome of a page request once retries are exhausted or skipped.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    /// Network, 5xx or 429 failures that persisted through every attempt.
    #[error("transient upstream failure after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: curseforge_api::Error,
    },
    /// Rejected request, malformed or oversized response. Never retried.
    #[error("fatal upstream failure: {0}")]
    Fatal(#[source] curseforge_api::Error),
    /// The breaker tripped; no request was sent.
    #[error("circuit open after {failures} consecutive transient failures")]
    CircuitOpen { failures: u32 },
}

impl UpstreamError {
    /// Whether this failure should stop the current sort strategy outright.
    pub fn aborts_strategy(&self) -> bool {
        matches!(
            self,
            UpstreamError::Fatal(_) | UpstreamError::CircuitOpen { .. }
        )
    }
}

/// The item upsert and its snapshot were rolled back together.
#[derive(thiserror::Error, Debug)]
#[error("write for item {item_id} rolled back: {source}")]
pub struct WriteConsistencyError {
    pub item_id: i64,
    #[source]
    pub source: DbError,
}

/// An item's aggregate row could not be used for scoring.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("item {item_id} skipped during scoring: {reason}")]
pub struct ScoringSkipped {
    pub item_id: i64,
    pub reason: String,
}

/// Errors produced while turning user or environment input into settings.
#[derive(Debug)]
pub enum InputError {
    /// User-provided input failed validation.
    InvalidInput(String),
    /// A required environment variable is not set.
    MissingEnv(&'static str),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::MissingEnv(key) => write!(f, "Missing environment variable: {}", key),
        }
    }
}

impl std::error::Error for InputError {}
