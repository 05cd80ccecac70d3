//! Library layer for addonpulse: resilient upstream access, snapshot storage,
//! trending scores and retention.
//!
//! Wraps the `curseforge_api` crate with retry, backoff and a circuit
//! breaker, and persists everything to SQLite.

pub mod breaker;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod retention;
pub mod sync;
pub mod trending;
pub mod validation;

pub use curseforge_api;
pub use curseforge_api::types;
pub use curseforge_api::{ModSearchQuery, ModSortField, Query, SortOrder};

pub use client::{ResilientClient, RetryConfig, UpstreamConfig};
pub use config::Settings;
pub use db::{Db, DbError, ItemRecord, LeaderboardRow};
pub use error::{InputError, ScoringSkipped, UpstreamError, WriteConsistencyError};
pub use retention::{RetentionPolicy, SweepSummary};
pub use sync::{run_cycle, SyncError, SyncOptions, SyncReport};
pub use trending::{Leaderboard, RankDelta, TrendingSummary};
