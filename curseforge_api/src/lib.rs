//! Thin HTTP client for the CurseForge-style mod listing API.
//!
//! Only the search endpoint and the fields the ingestion pipeline consumes are
//! modelled. Retry, backoff and circuit breaking live one layer up.

mod client;
mod errors;
mod query;
pub mod types;

pub use self::client::{Client, DEFAULT_MAX_BODY_BYTES};
pub use self::errors::Error;
pub use self::query::{
    ModSearchQuery, ModSortField, Query, QueryCommon, SortOrder, MAX_RESULT_WINDOW,
};
