//! SQLite storage for add-on state, snapshot history and leaderboards.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;

use crate::error::{ScoringSkipped, WriteConsistencyError};
use crate::trending::{
    ItemStats, Leaderboard, PriorState, RankDelta, ScoringOutcome, TrendingScore, WindowCutoffs,
};
use crate::types::Mod;

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("snapshot for item {item_id} at {attempted} is older than stored {latest}")]
    OutOfOrderSnapshot {
        item_id: i64,
        latest: String,
        attempted: String,
    },
}

/// Current schema revision, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 2;

pub struct Db {
    conn: Connection,
}

/// Decoded item as written to `items` and `snapshots`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub logo_url: Option<String>,
    pub game_versions: Vec<String>,
    pub download_count: i64,
    pub thumbs_up_count: i64,
    pub popularity_rank: Option<i64>,
    pub rating: Option<f64>,
    pub latest_file_date: Option<DateTime<Utc>>,
}

impl From<&Mod> for ItemRecord {
    fn from(m: &Mod) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            slug: m.slug.clone(),
            author: m.primary_author().map(str::to_string),
            categories: m.category_names(),
            logo_url: m.logo.as_ref().and_then(|l| l.thumbnail_url.clone()),
            game_versions: m.game_versions(),
            download_count: m.download_count,
            thumbs_up_count: m.thumbs_up_count,
            popularity_rank: m.game_popularity_rank,
            rating: m.rating,
            latest_file_date: m.latest_file_date(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub game_versions: Vec<String>,
    pub download_count: i64,
    pub thumbs_up_count: i64,
    pub popularity_rank: Option<i64>,
    pub rating: Option<f64>,
    pub latest_file_date: Option<DateTime<Utc>>,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub id: i64,
    pub item_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub download_count: i64,
    pub thumbs_up_count: i64,
    pub popularity_rank: Option<i64>,
    pub rating: Option<f64>,
    pub latest_file_date: Option<DateTime<Utc>>,
}

/// One leaderboard line for the read side.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: i64,
    pub item_id: i64,
    pub name: String,
    pub slug: String,
    pub author: Option<String>,
    pub download_count: i64,
    pub score: f64,
    pub download_velocity: f64,
    pub entered_at: Option<DateTime<Utc>>,
    pub change_24h: RankDelta,
    pub change_7d: RankDelta,
}

/// Fixed-width RFC 3339 so that text comparison in SQL orders correctly.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_ts(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn required_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    ts_column(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "timestamp".to_string(),
        Type::Null,
    ))
}

fn json_list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Transaction-scoped unit of work for one item: the current-state upsert and
/// the snapshot append commit together or not at all. Dropping the unit
/// without calling [`SnapshotUnit::commit`] rolls both back.
pub struct SnapshotUnit<'a> {
    tx: Transaction<'a>,
}

impl<'a> SnapshotUnit<'a> {
    /// Inserts or refreshes the item's current state and marks it active.
    pub fn upsert_item(&self, item: &ItemRecord, at: &DateTime<Utc>) -> Result<(), DbError> {
        let at = format_ts(at);
        self.tx.execute(
            "INSERT INTO items (
               id, name, slug, author, categories, logo_url, game_versions,
               download_count, thumbs_up_count, popularity_rank, rating, latest_file_date,
               status, first_seen_at, updated_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'active', ?13, ?13)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               slug = excluded.slug,
               author = COALESCE(excluded.author, items.author),
               categories = excluded.categories,
               logo_url = COALESCE(excluded.logo_url, items.logo_url),
               game_versions = excluded.game_versions,
               download_count = excluded.download_count,
               thumbs_up_count = excluded.thumbs_up_count,
               popularity_rank = excluded.popularity_rank,
               rating = excluded.rating,
               latest_file_date = COALESCE(excluded.latest_file_date, items.latest_file_date),
               status = 'active',
               updated_at = excluded.updated_at",
            params![
                item.id,
                item.name,
                item.slug,
                item.author,
                serde_json::to_string(&item.categories)?,
                item.logo_url,
                serde_json::to_string(&item.game_versions)?,
                item.download_count,
                item.thumbs_up_count,
                item.popularity_rank,
                item.rating,
                item.latest_file_date.as_ref().map(format_ts),
                at,
            ],
        )?;
        Ok(())
    }

    /// Appends one history point. Refuses to go back in time for an item.
    pub fn append_snapshot(&self, item: &ItemRecord, at: &DateTime<Utc>) -> Result<(), DbError> {
        let at = format_ts(at);
        let latest: Option<String> = self.tx.query_row(
            "SELECT MAX(recorded_at) FROM snapshots WHERE item_id = ?1",
            params![item.id],
            |row| row.get(0),
        )?;
        if let Some(latest) = latest {
            if latest > at {
                return Err(DbError::OutOfOrderSnapshot {
                    item_id: item.id,
                    latest,
                    attempted: at,
                });
            }
        }
        self.tx.execute(
            "INSERT INTO snapshots (
               item_id, recorded_at, download_count, thumbs_up_count,
               popularity_rank, rating, latest_file_date
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.id,
                at,
                item.download_count,
                item.thumbs_up_count,
                item.popularity_rank,
                item.rating,
                item.latest_file_date.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for tests).
    #[doc(hidden)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn init(&self) -> Result<(), DbError> {
        // Migrations run before the DDL so that a database created by an
        // older build gains the columns the current indexes expect.
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 2 {
            self.migrate_v2()?;
        }

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn migrate_v2(&self) -> Result<(), DbError> {
        for sql in &[
            "ALTER TABLE trending_scores ADD COLUMN snapshot_count_24h INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE trending_scores ADD COLUMN snapshot_count_7d INTEGER NOT NULL DEFAULT 0",
        ] {
            match self.conn.execute(sql, []) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                    if msg.contains("duplicate column name")
                        || msg.contains("no such table") => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Starts the per-item unit of work.
    pub fn begin_snapshot(&mut self) -> Result<SnapshotUnit<'_>, DbError> {
        Ok(SnapshotUnit {
            tx: self.conn.transaction()?,
        })
    }

    /// Writes the item's current state and a new snapshot atomically.
    pub fn write_snapshot(
        &mut self,
        item: &ItemRecord,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), WriteConsistencyError> {
        let wrap = |source: DbError| WriteConsistencyError {
            item_id: item.id,
            source,
        };
        let unit = self.begin_snapshot().map_err(wrap)?;
        let staged = unit
            .upsert_item(item, &recorded_at)
            .and_then(|_| unit.append_snapshot(item, &recorded_at));
        match staged {
            Ok(()) => unit.commit().map_err(wrap),
            Err(err) => {
                if let Err(rollback_err) = unit.rollback() {
                    tracing::warn!("Rollback for item {} failed: {}", item.id, rollback_err);
                }
                Err(wrap(err))
            }
        }
    }

    pub fn get_item(&self, id: i64) -> Result<Option<ItemRow>, DbError> {
        self.conn
            .query_row(
                "SELECT id, name, slug, author, categories, game_versions, download_count,
                        thumbs_up_count, popularity_rank, rating, latest_file_date, status,
                        first_seen_at, updated_at
                 FROM items WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ItemRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                        author: row.get(3)?,
                        categories: json_list_column(row, 4)?,
                        game_versions: json_list_column(row, 5)?,
                        download_count: row.get(6)?,
                        thumbs_up_count: row.get(7)?,
                        popularity_rank: row.get(8)?,
                        rating: row.get(9)?,
                        latest_file_date: ts_column(row, 10)?,
                        status: row.get(11)?,
                        first_seen_at: required_ts_column(row, 12)?,
                        updated_at: required_ts_column(row, 13)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn latest_snapshot(&self, item_id: i64) -> Result<Option<SnapshotRow>, DbError> {
        self.conn
            .query_row(
                "SELECT id, item_id, recorded_at, download_count, thumbs_up_count,
                        popularity_rank, rating, latest_file_date
                 FROM snapshots WHERE item_id = ?1
                 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                params![item_id],
                |row| {
                    Ok(SnapshotRow {
                        id: row.get(0)?,
                        item_id: row.get(1)?,
                        recorded_at: required_ts_column(row, 2)?,
                        download_count: row.get(3)?,
                        thumbs_up_count: row.get(4)?,
                        popularity_rank: row.get(5)?,
                        rating: row.get(6)?,
                        latest_file_date: ts_column(row, 7)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn snapshot_count(&self, item_id: i64) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM snapshots WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn active_item_count(&self) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM items WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Soft-deletes every active item that is not in `seen`. Returns how many
    /// items were flipped to inactive.
    pub fn mark_inactive_except(
        &mut self,
        seen: &HashSet<i64>,
        at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut select = tx.prepare("SELECT id FROM items WHERE status = 'active'")?;
            let active = select
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut update = tx.prepare(
                "UPDATE items SET status = 'inactive', updated_at = ?2 WHERE id = ?1",
            )?;
            let at = format_ts(&at);
            for id in active.into_iter().filter(|id| !seen.contains(id)) {
                changed += update.execute(params![id, at])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Bulk aggregate over the snapshot windows for every active item.
    ///
    /// Rows that cannot be decoded or carry impossible values are returned
    /// separately instead of failing the whole read.
    pub fn item_stats(
        &self,
        cutoffs: &WindowCutoffs,
        now: DateTime<Utc>,
    ) -> Result<(Vec<ItemStats>, Vec<ScoringSkipped>), DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id,
                    i.download_count,
                    i.thumbs_up_count,
                    MAX(CASE WHEN s.recorded_at >= ?1 THEN s.download_count END)
                      - MIN(CASE WHEN s.recorded_at >= ?1 THEN s.download_count END),
                    MAX(CASE WHEN s.recorded_at >= ?1 THEN s.thumbs_up_count END)
                      - MIN(CASE WHEN s.recorded_at >= ?1 THEN s.thumbs_up_count END),
                    COUNT(CASE WHEN s.recorded_at >= ?1 THEN 1 END),
                    MAX(CASE WHEN s.recorded_at >= ?2 THEN s.download_count END)
                      - MIN(CASE WHEN s.recorded_at >= ?2 THEN s.download_count END),
                    MAX(CASE WHEN s.recorded_at >= ?2 THEN s.thumbs_up_count END)
                      - MIN(CASE WHEN s.recorded_at >= ?2 THEN s.thumbs_up_count END),
                    COUNT(CASE WHEN s.recorded_at >= ?2 THEN 1 END),
                    COUNT(DISTINCT CASE WHEN s.latest_file_date >= ?3 THEN s.latest_file_date END)
             FROM items i
             LEFT JOIN snapshots s
               ON s.item_id = i.id AND s.recorded_at >= ?3 AND s.recorded_at <= ?4
             WHERE i.status = 'active'
             GROUP BY i.id
             ORDER BY i.id",
        )?;

        let rows = stmt.query_map(
            params![
                format_ts(&cutoffs.short),
                format_ts(&cutoffs.long),
                format_ts(&cutoffs.maintenance),
                format_ts(&now),
            ],
            |row| {
                let item_id: i64 = row.get(0)?;
                let decoded = (|| -> rusqlite::Result<ItemStats> {
                    Ok(ItemStats {
                        item_id,
                        download_count: row.get(1)?,
                        thumbs_up_count: row.get(2)?,
                        download_change_24h: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        thumbs_change_24h: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        snapshots_24h: row.get(5)?,
                        download_change_7d: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
                        thumbs_change_7d: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
                        snapshots_7d: row.get(8)?,
                        file_updates_90d: row.get(9)?,
                    })
                })();
                Ok(decoded
                    .map_err(|e| ScoringSkipped {
                        item_id,
                        reason: e.to_string(),
                    })
                    .and_then(|stats| {
                        if stats.download_count < 0 || stats.thumbs_up_count < 0 {
                            Err(ScoringSkipped {
                                item_id,
                                reason: "negative metric value".to_string(),
                            })
                        } else {
                            Ok(stats)
                        }
                    }))
            },
        )?;

        let mut stats = Vec::new();
        let mut skipped = Vec::new();
        for row in rows {
            match row? {
                Ok(s) => stats.push(s),
                Err(skip) => skipped.push(skip),
            }
        }
        Ok((stats, skipped))
    }

    /// Entry timestamps from the previous calculation, keyed by item.
    pub fn trending_states(&self) -> Result<HashMap<i64, PriorState>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, first_hot_at, first_rising_at FROM trending_scores")?;
        let rows = stmt.query_map([], |row| {
            let item_id: i64 = row.get(0)?;
            let hot: Option<String> = row.get(1)?;
            let rising: Option<String> = row.get(2)?;
            Ok((item_id, hot, rising))
        })?;

        let mut states = HashMap::new();
        for row in rows {
            let (item_id, hot, rising) = row?;
            states.insert(
                item_id,
                PriorState {
                    first_hot_at: lenient_ts(item_id, hot.as_deref()),
                    first_rising_at: lenient_ts(item_id, rising.as_deref()),
                },
            );
        }
        Ok(states)
    }

    /// Persists a calculation: upserts every score, appends the rank rows and
    /// zeroes the rows of items that are no longer active.
    pub fn save_trending(
        &mut self,
        outcome: &ScoringOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt_score = tx.prepare(
                "INSERT INTO trending_scores (
                   item_id, hot_score, rising_score, download_velocity, thumbs_velocity,
                   download_growth_pct, thumbs_growth_pct, size_multiplier,
                   maintenance_multiplier, snapshot_count_24h, snapshot_count_7d,
                   first_hot_at, first_rising_at, calculated_at
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(item_id) DO UPDATE SET
                   hot_score = excluded.hot_score,
                   rising_score = excluded.rising_score,
                   download_velocity = excluded.download_velocity,
                   thumbs_velocity = excluded.thumbs_velocity,
                   download_growth_pct = excluded.download_growth_pct,
                   thumbs_growth_pct = excluded.thumbs_growth_pct,
                   size_multiplier = excluded.size_multiplier,
                   maintenance_multiplier = excluded.maintenance_multiplier,
                   snapshot_count_24h = excluded.snapshot_count_24h,
                   snapshot_count_7d = excluded.snapshot_count_7d,
                   first_hot_at = excluded.first_hot_at,
                   first_rising_at = excluded.first_rising_at,
                   calculated_at = excluded.calculated_at",
            )?;
            let mut stmt_rank = tx.prepare(
                "INSERT INTO rank_history (item_id, category, rank, score, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let at = format_ts(&now);

            for score in &outcome.scores {
                stmt_score.execute(params![
                    score.item_id,
                    score.hot_score,
                    score.rising_score,
                    score.download_velocity,
                    score.thumbs_velocity,
                    score.download_growth_pct,
                    score.thumbs_growth_pct,
                    score.size_multiplier,
                    score.maintenance_multiplier,
                    score.snapshot_count_24h,
                    score.snapshot_count_7d,
                    score.first_hot_at.as_ref().map(format_ts),
                    score.first_rising_at.as_ref().map(format_ts),
                    at,
                ])?;
            }
            for rank in &outcome.ranks {
                stmt_rank.execute(params![
                    rank.item_id,
                    rank.board.as_str(),
                    rank.rank,
                    rank.score,
                    at
                ])?;
            }

            // Inactive items fall off both boards, so a later return starts
            // with a fresh age.
            let reset = tx.execute(
                "UPDATE trending_scores
                 SET hot_score = 0, rising_score = 0,
                     first_hot_at = NULL, first_rising_at = NULL,
                     calculated_at = ?1
                 WHERE item_id IN (SELECT id FROM items WHERE status <> 'active')
                   AND (hot_score > 0 OR rising_score > 0
                        OR first_hot_at IS NOT NULL OR first_rising_at IS NOT NULL)",
                params![at],
            )?;
            if reset > 0 {
                tracing::debug!("Cleared trending state for {} inactive items", reset);
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn trending_score(&self, item_id: i64) -> Result<Option<TrendingScore>, DbError> {
        self.conn
            .query_row(
                "SELECT item_id, hot_score, rising_score, download_velocity, thumbs_velocity,
                        download_growth_pct, thumbs_growth_pct, size_multiplier,
                        maintenance_multiplier, snapshot_count_24h, snapshot_count_7d,
                        first_hot_at, first_rising_at
                 FROM trending_scores WHERE item_id = ?1",
                params![item_id],
                |row| {
                    Ok(TrendingScore {
                        item_id: row.get(0)?,
                        hot_score: row.get(1)?,
                        rising_score: row.get(2)?,
                        download_velocity: row.get(3)?,
                        thumbs_velocity: row.get(4)?,
                        download_growth_pct: row.get(5)?,
                        thumbs_growth_pct: row.get(6)?,
                        size_multiplier: row.get(7)?,
                        maintenance_multiplier: row.get(8)?,
                        snapshot_count_24h: row.get(9)?,
                        snapshot_count_7d: row.get(10)?,
                        first_hot_at: ts_column(row, 11)?,
                        first_rising_at: ts_column(row, 12)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Most recent rank on `board` recorded at or before `at`.
    pub fn rank_at_or_before(
        &self,
        item_id: i64,
        board: Leaderboard,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError> {
        self.conn
            .query_row(
                "SELECT rank FROM rank_history
                 WHERE item_id = ?1 AND category = ?2 AND recorded_at <= ?3
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
                params![item_id, board.as_str(), format_ts(&at)],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Current board for active items, with rank movement over 24h and 7d.
    pub fn leaderboard(
        &self,
        board: Leaderboard,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardRow>, DbError> {
        let sql = match board {
            Leaderboard::Hot => {
                "SELECT i.id, i.name, i.slug, i.author, i.download_count,
                        t.hot_score, t.download_velocity, t.first_hot_at
                 FROM trending_scores t
                 JOIN items i ON i.id = t.item_id
                 WHERE i.status = 'active' AND t.hot_score > 0
                 ORDER BY t.hot_score DESC, i.id ASC
                 LIMIT ?1"
            }
            Leaderboard::Rising => {
                "SELECT i.id, i.name, i.slug, i.author, i.download_count,
                        t.rising_score, t.download_velocity, t.first_rising_at
                 FROM trending_scores t
                 JOIN items i ON i.id = t.item_id
                 WHERE i.status = 'active' AND t.rising_score > 0
                 ORDER BY t.rising_score DESC, i.id ASC
                 LIMIT ?1"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    ts_column(row, 7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);
        let mut out = Vec::with_capacity(rows.len());
        for (idx, (item_id, name, slug, author, downloads, score, velocity, entered)) in
            rows.into_iter().enumerate()
        {
            let rank = idx as i64 + 1;
            out.push(LeaderboardRow {
                rank,
                item_id,
                name,
                slug,
                author,
                download_count: downloads,
                score,
                download_velocity: velocity,
                entered_at: entered,
                change_24h: RankDelta::between(
                    rank,
                    self.rank_at_or_before(item_id, board, day_ago)?,
                ),
                change_7d: RankDelta::between(
                    rank,
                    self.rank_at_or_before(item_id, board, week_ago)?,
                ),
            });
        }
        Ok(out)
    }

    /// Deletes up to `batch_size` snapshots recorded before `cutoff`, oldest
    /// insertion first. Returns the number of rows removed.
    pub fn delete_snapshots_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<usize, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM snapshots WHERE id IN (
               SELECT id FROM snapshots WHERE recorded_at < ?1 ORDER BY id LIMIT ?2
             )",
            params![format_ts(&cutoff), batch_size as i64],
        )?;
        Ok(deleted)
    }

    pub fn delete_rank_history_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<usize, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM rank_history WHERE id IN (
               SELECT id FROM rank_history WHERE recorded_at < ?1 ORDER BY id LIMIT ?2
             )",
            params![format_ts(&cutoff), batch_size as i64],
        )?;
        Ok(deleted)
    }

    pub fn count_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM snapshots WHERE recorded_at < ?1",
            params![format_ts(&cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_rank_history_before(&self, cutoff: DateTime<Utc>) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM rank_history WHERE recorded_at < ?1",
            params![format_ts(&cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn lenient_ts(item_id: i64, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match parse_ts(raw) {
        Ok(ts) => Some(ts),
        Err(e) => {
            // An unreadable entry time only costs the item its accumulated age.
            tracing::warn!("Ignoring bad entry timestamp {:?} for item {}: {}", raw, item_id, e);
            None
        }
    }
}
