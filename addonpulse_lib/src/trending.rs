//! Hot / rising leaderboard scoring.
//!
//! Every cycle the calculator reads one aggregate row per active item
//! (metric deltas over 24h and 7d windows, snapshot counts, recent file
//! releases), turns those into per-hour velocities, weights them by item
//! size and maintenance cadence, and applies a gravity decay keyed on how
//! long the item has been on the board. Only the top of each board keeps its
//! "entered at" timestamp; dropping off resets the age for the next entry.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{Db, DbError};

pub const HOT_MIN_DOWNLOADS: i64 = 500;
pub const RISING_MIN_DOWNLOADS: i64 = 50;
pub const RISING_MAX_DOWNLOADS: i64 = 10_000;

/// How many ranks per board keep their entry timestamp.
pub const LEADERBOARD_SIZE: usize = 20;

pub const HOT_GRAVITY: f64 = 1.5;
pub const RISING_GRAVITY: f64 = 1.8;

/// Snapshots needed in the last 24h before that window is trusted.
pub const MIN_SNAPSHOTS_24H: i64 = 6;

pub const SHORT_WINDOW_HOURS: f64 = 24.0;
pub const LONG_WINDOW_HOURS: f64 = 168.0;
pub const MAINTENANCE_WINDOW_DAYS: i64 = 90;

pub const SIZE_MULTIPLIER_FLOOR: f64 = 0.1;
pub const MAINTENANCE_MIN: f64 = 0.95;
pub const MAINTENANCE_MAX: f64 = 1.15;

const AGE_OFFSET_HOURS: f64 = 2.0;
const DOWNLOAD_WEIGHT: f64 = 0.7;
const THUMBS_WEIGHT: f64 = 0.2;
const MAINTENANCE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Leaderboard {
    Hot,
    Rising,
}

impl Leaderboard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leaderboard::Hot => "hot",
            Leaderboard::Rising => "rising",
        }
    }
}

impl std::fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Leaderboard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(Leaderboard::Hot),
            "rising" => Ok(Leaderboard::Rising),
            other => Err(format!("unknown leaderboard '{}': expected hot or rising", other)),
        }
    }
}

/// Aggregate snapshot statistics for one active item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemStats {
    pub item_id: i64,
    pub download_count: i64,
    pub thumbs_up_count: i64,
    pub download_change_24h: i64,
    pub thumbs_change_24h: i64,
    pub snapshots_24h: i64,
    pub download_change_7d: i64,
    pub thumbs_change_7d: i64,
    pub snapshots_7d: i64,
    /// Distinct file release dates seen in the maintenance window.
    pub file_updates_90d: i64,
}

/// Board entry timestamps carried over from the previous cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorState {
    pub first_hot_at: Option<DateTime<Utc>>,
    pub first_rising_at: Option<DateTime<Utc>>,
}

/// Latest computed state for one item, persisted to `trending_scores`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingScore {
    pub item_id: i64,
    pub hot_score: f64,
    pub rising_score: f64,
    pub download_velocity: f64,
    pub thumbs_velocity: f64,
    pub download_growth_pct: f64,
    pub thumbs_growth_pct: f64,
    pub size_multiplier: f64,
    pub maintenance_multiplier: f64,
    pub snapshot_count_24h: i64,
    pub snapshot_count_7d: i64,
    pub first_hot_at: Option<DateTime<Utc>>,
    pub first_rising_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub item_id: i64,
    pub board: Leaderboard,
    pub rank: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    pub scores: Vec<TrendingScore>,
    pub ranks: Vec<RankEntry>,
    pub p95_downloads: f64,
}

impl ScoringOutcome {
    pub fn ranked(&self, board: Leaderboard) -> impl Iterator<Item = &RankEntry> {
        self.ranks.iter().filter(move |r| r.board == board)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrendingSummary {
    pub scored: usize,
    pub skipped: usize,
    pub hot_ranked: usize,
    pub rising_ranked: usize,
    pub p95_downloads: f64,
}

/// Movement relative to an earlier rank on the same board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDelta {
    New,
    Unchanged,
    Up(i64),
    Down(i64),
}

impl RankDelta {
    pub fn between(current: i64, previous: Option<i64>) -> Self {
        match previous {
            None => RankDelta::New,
            Some(prev) if prev == current => RankDelta::Unchanged,
            Some(prev) if prev > current => RankDelta::Up(prev - current),
            Some(prev) => RankDelta::Down(current - prev),
        }
    }
}

impl std::fmt::Display for RankDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankDelta::New => f.write_str("new"),
            RankDelta::Unchanged => f.write_str("="),
            RankDelta::Up(n) => write!(f, "+{}", n),
            RankDelta::Down(n) => write!(f, "-{}", n),
        }
    }
}

/// Logarithmic size weight relative to the 95th percentile of downloads.
pub fn size_multiplier(downloads: i64, p95: f64) -> f64 {
    if !(p95 > 0.0) {
        return 1.0;
    }
    if downloads <= 0 {
        return SIZE_MULTIPLIER_FLOOR;
    }
    let ratio = ((downloads as f64) + 1.0).log10() / (p95 + 1.0).log10();
    if !ratio.is_finite() {
        return 1.0;
    }
    ratio.clamp(SIZE_MULTIPLIER_FLOOR, 1.0)
}

/// Reward for regular file releases over the maintenance window.
pub fn maintenance_multiplier(update_count: i64) -> f64 {
    if update_count <= 0 {
        return MAINTENANCE_MIN;
    }
    let avg_days_between = MAINTENANCE_WINDOW_DAYS as f64 / update_count as f64;
    if avg_days_between <= 14.0 {
        1.15
    } else if avg_days_between <= 30.0 {
        1.10
    } else if avg_days_between <= 60.0 {
        1.05
    } else {
        1.00
    }
}

/// Nearest-rank percentile. Empty input yields 0.
pub fn percentile(values: &[i64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    let idx = rank.clamp(1, sorted.len()) - 1;
    sorted[idx] as f64
}

/// `signal / (age + 2)^gravity`, clamped to a finite non-negative value.
pub fn decayed_score(signal: f64, age_hours: f64, gravity: f64) -> f64 {
    let age = if age_hours.is_finite() { age_hours.max(0.0) } else { 0.0 };
    let score = signal / (age + AGE_OFFSET_HOURS).powf(gravity);
    if score.is_finite() && score > 0.0 {
        score
    } else {
        0.0
    }
}

/// Velocities and changes from whichever window is trustworthy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReading {
    pub download_change: i64,
    pub thumbs_change: i64,
    pub hours: f64,
    pub download_velocity: f64,
    pub thumbs_velocity: f64,
}

pub fn select_window(stats: &ItemStats) -> WindowReading {
    let (download_change, thumbs_change, count, hours) = if stats.snapshots_24h >= MIN_SNAPSHOTS_24H
    {
        (
            stats.download_change_24h,
            stats.thumbs_change_24h,
            stats.snapshots_24h,
            SHORT_WINDOW_HOURS,
        )
    } else {
        (
            stats.download_change_7d,
            stats.thumbs_change_7d,
            stats.snapshots_7d,
            LONG_WINDOW_HOURS,
        )
    };
    let rate = |change: i64| {
        if count == 0 || hours <= 0.0 {
            0.0
        } else {
            change.max(0) as f64 / hours
        }
    };
    WindowReading {
        download_change,
        thumbs_change,
        hours,
        download_velocity: rate(download_change),
        thumbs_velocity: rate(thumbs_change),
    }
}

fn growth_pct(current: i64, change: i64) -> f64 {
    let base = current - change;
    if base <= 0 || change <= 0 {
        return 0.0;
    }
    let pct = change as f64 / base as f64 * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

fn normalized(value: f64, max: f64) -> f64 {
    if max > 0.0 && value.is_finite() {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn age_hours(entered: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    entered
        .map(|t| ((now - t).num_seconds() as f64 / 3600.0).max(0.0))
        .unwrap_or(0.0)
}

fn is_hot_eligible(downloads: i64) -> bool {
    downloads >= HOT_MIN_DOWNLOADS
}

fn is_rising_eligible(downloads: i64) -> bool {
    (RISING_MIN_DOWNLOADS..=RISING_MAX_DOWNLOADS).contains(&downloads)
}

/// Eligible items (the only ones with a positive score), best first. Ties go
/// to the lower item id so ranks are stable between runs.
fn rank_board(board: Leaderboard, scored: &[(i64, f64)]) -> Vec<RankEntry> {
    let mut ranked: Vec<(i64, f64)> = scored.iter().copied().filter(|(_, s)| *s > 0.0).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (item_id, score))| RankEntry {
            item_id,
            board,
            rank: idx as i64 + 1,
            score,
        })
        .collect()
}

struct Signals {
    reading: WindowReading,
    size: f64,
    maintenance: f64,
}

/// Scores every item. Pure: all time-dependence goes through `now`.
pub fn compute_scores(
    stats: &[ItemStats],
    prior: &HashMap<i64, PriorState>,
    now: DateTime<Utc>,
) -> ScoringOutcome {
    let downloads: Vec<i64> = stats.iter().map(|s| s.download_count).collect();
    let p95 = percentile(&downloads, 95.0);

    let signals: Vec<Signals> = stats
        .iter()
        .map(|s| Signals {
            reading: select_window(s),
            size: size_multiplier(s.download_count, p95),
            maintenance: maintenance_multiplier(s.file_updates_90d),
        })
        .collect();

    let max_dl = signals
        .iter()
        .map(|s| s.reading.download_velocity)
        .fold(0.0_f64, f64::max);
    let max_thumbs = signals
        .iter()
        .map(|s| s.reading.thumbs_velocity)
        .fold(0.0_f64, f64::max);

    let weighted: Vec<f64> = signals
        .iter()
        .map(|s| {
            // Never zero, so an eligible item always lands on its board.
            let maint_norm = s.maintenance / MAINTENANCE_MAX;
            let blend = DOWNLOAD_WEIGHT * normalized(s.reading.download_velocity, max_dl)
                + THUMBS_WEIGHT * normalized(s.reading.thumbs_velocity, max_thumbs)
                + MAINTENANCE_WEIGHT * maint_norm.clamp(0.0, 1.0);
            let value = blend * s.size * s.maintenance;
            if value.is_finite() {
                value.max(0.0)
            } else {
                0.0
            }
        })
        .collect();

    let prior_of = |id: i64| prior.get(&id).cloned().unwrap_or_default();

    let hot: Vec<(i64, f64)> = stats
        .iter()
        .zip(&weighted)
        .map(|(s, w)| {
            let score = if is_hot_eligible(s.download_count) {
                decayed_score(*w, age_hours(prior_of(s.item_id).first_hot_at, now), HOT_GRAVITY)
            } else {
                0.0
            };
            (s.item_id, score)
        })
        .collect();
    let hot_ranks = rank_board(Leaderboard::Hot, &hot);
    let hot_top: HashSet<i64> = hot_ranks
        .iter()
        .take(LEADERBOARD_SIZE)
        .map(|r| r.item_id)
        .collect();

    let rising: Vec<(i64, f64)> = stats
        .iter()
        .zip(&weighted)
        .map(|(s, w)| {
            let eligible = is_rising_eligible(s.download_count) && !hot_top.contains(&s.item_id);
            let score = if eligible {
                decayed_score(
                    *w,
                    age_hours(prior_of(s.item_id).first_rising_at, now),
                    RISING_GRAVITY,
                )
            } else {
                0.0
            };
            (s.item_id, score)
        })
        .collect();
    let rising_ranks = rank_board(Leaderboard::Rising, &rising);
    let rising_top: HashSet<i64> = rising_ranks
        .iter()
        .take(LEADERBOARD_SIZE)
        .map(|r| r.item_id)
        .collect();

    let scores = stats
        .iter()
        .zip(&signals)
        .zip(hot.iter().zip(&rising))
        .map(|((s, sig), ((_, hot_score), (_, rising_score)))| {
            let before = prior_of(s.item_id);
            let first_hot_at = if hot_top.contains(&s.item_id) {
                Some(before.first_hot_at.unwrap_or(now))
            } else {
                None
            };
            let first_rising_at = if rising_top.contains(&s.item_id) {
                Some(before.first_rising_at.unwrap_or(now))
            } else {
                None
            };
            TrendingScore {
                item_id: s.item_id,
                hot_score: *hot_score,
                rising_score: *rising_score,
                download_velocity: sig.reading.download_velocity,
                thumbs_velocity: sig.reading.thumbs_velocity,
                download_growth_pct: growth_pct(s.download_count, sig.reading.download_change),
                thumbs_growth_pct: growth_pct(s.thumbs_up_count, sig.reading.thumbs_change),
                size_multiplier: sig.size,
                maintenance_multiplier: sig.maintenance,
                snapshot_count_24h: s.snapshots_24h,
                snapshot_count_7d: s.snapshots_7d,
                first_hot_at,
                first_rising_at,
            }
        })
        .collect();

    let mut ranks = hot_ranks;
    ranks.extend(rising_ranks);

    ScoringOutcome {
        scores,
        ranks,
        p95_downloads: p95,
    }
}

/// Window start times relative to `now`, used by the aggregate query.
pub struct WindowCutoffs {
    pub short: DateTime<Utc>,
    pub long: DateTime<Utc>,
    pub maintenance: DateTime<Utc>,
}

impl WindowCutoffs {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            short: now - Duration::hours(SHORT_WINDOW_HOURS as i64),
            long: now - Duration::hours(LONG_WINDOW_HOURS as i64),
            maintenance: now - Duration::days(MAINTENANCE_WINDOW_DAYS),
        }
    }
}

/// Runs one calculation cycle against the store.
pub fn run(db: &mut Db, now: DateTime<Utc>) -> Result<TrendingSummary, DbError> {
    let (stats, skipped) = db.item_stats(&WindowCutoffs::at(now), now)?;
    for skip in &skipped {
        tracing::warn!("{}", skip);
    }
    let prior = db.trending_states()?;
    let outcome = compute_scores(&stats, &prior, now);
    db.save_trending(&outcome, now)?;

    let summary = TrendingSummary {
        scored: outcome.scores.len(),
        skipped: skipped.len(),
        hot_ranked: outcome.ranked(Leaderboard::Hot).count(),
        rising_ranked: outcome.ranked(Leaderboard::Rising).count(),
        p95_downloads: outcome.p95_downloads,
    };
    tracing::info!(
        "Trending scores updated: {} scored, {} skipped, {} hot, {} rising (p95 downloads {:.0})",
        summary.scored,
        summary.skipped,
        summary.hot_ranked,
        summary.rising_ranked,
        summary.p95_downloads
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ItemRecord;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn steady(item_id: i64, downloads: i64, gain_24h: i64) -> ItemStats {
        ItemStats {
            item_id,
            download_count: downloads,
            thumbs_up_count: 10,
            download_change_24h: gain_24h,
            thumbs_change_24h: 1,
            snapshots_24h: 24,
            download_change_7d: gain_24h * 7,
            thumbs_change_7d: 7,
            snapshots_7d: 168,
            file_updates_90d: 3,
        }
    }

    #[test]
    fn size_multiplier_bounds_and_degenerate_p95() {
        assert_eq!(size_multiplier(0, 500_000.0), SIZE_MULTIPLIER_FLOOR);
        assert_eq!(size_multiplier(1_000_000, 500_000.0), 1.0);
        assert_eq!(size_multiplier(123, 0.0), 1.0);
        assert_eq!(size_multiplier(123, -5.0), 1.0);
        assert_eq!(size_multiplier(123, f64::NAN), 1.0);
    }

    #[test]
    fn size_multiplier_is_monotonic() {
        let p95 = 250_000.0;
        let mut last = 0.0;
        for d in [0, 1, 5, 50, 500, 5_000, 50_000, 250_000, 10_000_000] {
            let m = size_multiplier(d, p95);
            assert!(m >= last, "{} dropped below {}", m, last);
            assert!((SIZE_MULTIPLIER_FLOOR..=1.0).contains(&m));
            last = m;
        }
    }

    #[test]
    fn maintenance_multiplier_steps() {
        assert_eq!(maintenance_multiplier(0), 0.95);
        assert_eq!(maintenance_multiplier(-1), 0.95);
        assert_eq!(maintenance_multiplier(10), 1.15); // 9 days
        assert_eq!(maintenance_multiplier(7), 1.15);
        assert_eq!(maintenance_multiplier(6), 1.10); // 15 days
    }

    #[test]
    fn maintenance_multiplier_non_increasing_with_gap() {
        // Fewer updates means a longer average gap.
        let mut last = f64::MAX;
        for n in (1..=30).rev() {
            let m = maintenance_multiplier(n);
            assert!(m <= last);
            last = m;
        }
        assert_eq!(maintenance_multiplier(3), 1.10);
        assert_eq!(maintenance_multiplier(2), 1.05);
        assert_eq!(maintenance_multiplier(1), 1.00);
    }

    #[test]
    fn percentile_nearest_rank() {
        let values: Vec<i64> = (1..=100).collect();
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&[7], 95.0), 7.0);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn decayed_score_guards() {
        assert_eq!(decayed_score(0.0, 0.0, HOT_GRAVITY), 0.0);
        assert_eq!(decayed_score(-1.0, 0.0, HOT_GRAVITY), 0.0);
        assert_eq!(decayed_score(f64::NAN, 0.0, HOT_GRAVITY), 0.0);
        let fresh = decayed_score(1.0, 0.0, HOT_GRAVITY);
        let old = decayed_score(1.0, 48.0, HOT_GRAVITY);
        assert!(fresh > old && old > 0.0);
        // Rising decays harder at the same age.
        assert!(decayed_score(1.0, 10.0, RISING_GRAVITY) < decayed_score(1.0, 10.0, HOT_GRAVITY));
    }

    #[test]
    fn window_prefers_confident_24h() {
        let stats = ItemStats {
            download_change_24h: 1000,
            snapshots_24h: 10,
            download_change_7d: 3000,
            snapshots_7d: 40,
            ..Default::default()
        };
        let reading = select_window(&stats);
        assert_eq!(reading.hours, 24.0);
        assert!((reading.download_velocity - 41.666).abs() < 0.01);
    }

    #[test]
    fn window_falls_back_to_7d() {
        let stats = ItemStats {
            download_change_24h: 1000,
            snapshots_24h: 2,
            download_change_7d: 1680,
            snapshots_7d: 30,
            ..Default::default()
        };
        let reading = select_window(&stats);
        assert_eq!(reading.hours, 168.0);
        assert!((reading.download_velocity - 10.0).abs() < 1e-9);

        let empty = select_window(&ItemStats::default());
        assert_eq!(empty.download_velocity, 0.0);
        assert_eq!(empty.thumbs_velocity, 0.0);
    }

    #[test]
    fn scenario_mid_sized_item_gets_hot_score() {
        let item = ItemStats {
            item_id: 1,
            download_count: 5000,
            thumbs_up_count: 40,
            download_change_24h: 1000,
            thumbs_change_24h: 4,
            snapshots_24h: 10,
            download_change_7d: 1000,
            thumbs_change_7d: 4,
            snapshots_7d: 10,
            file_updates_90d: 4,
        };
        let reading = select_window(&item);
        assert!((reading.download_velocity - 41.67).abs() < 0.01);

        let size = size_multiplier(5000, 500_000.0);
        let expected = 5001f64.log10() / 500_001f64.log10();
        assert!((size - expected).abs() < 1e-12);
        assert!((size - 0.636).abs() < 0.02, "size multiplier was {}", size);

        let outcome = compute_scores(&[item], &HashMap::new(), now());
        let score = &outcome.scores[0];
        assert!(score.hot_score > 0.0);
        // On the hot board, so not a rising candidate this cycle.
        assert_eq!(score.rising_score, 0.0);
        assert_eq!(score.first_hot_at, Some(now()));
    }

    #[test]
    fn small_items_never_hot() {
        let items = vec![steady(1, 100, 90), steady(2, 499, 400), steady(3, 2_000, 10)];
        let outcome = compute_scores(&items, &HashMap::new(), now());
        assert_eq!(outcome.scores[0].hot_score, 0.0);
        assert_eq!(outcome.scores[1].hot_score, 0.0);
        assert!(outcome.scores[2].hot_score > 0.0);
        // The small ones are still rising candidates.
        assert!(outcome.scores[0].rising_score > 0.0);
    }

    #[test]
    fn large_items_never_rising() {
        let items = vec![steady(1, 50_000, 5_000), steady(2, 10_001, 10)];
        let outcome = compute_scores(&items, &HashMap::new(), now());
        for score in &outcome.scores {
            assert_eq!(score.rising_score, 0.0);
            assert!(score.first_rising_at.is_none());
        }
    }

    #[test]
    fn hot_top_twenty_excluded_from_rising() {
        // Item 1 is hot-eligible and in the rising download range.
        let items = vec![steady(1, 5_000, 800), steady(2, 300, 50)];
        let outcome = compute_scores(&items, &HashMap::new(), now());
        assert!(outcome.scores[0].hot_score > 0.0);
        assert_eq!(outcome.scores[0].rising_score, 0.0);
        assert!(outcome.scores[1].rising_score > 0.0);
    }

    #[test]
    fn scores_are_never_negative() {
        let mut weird = steady(9, 1_000, -50);
        weird.thumbs_change_24h = -3;
        weird.file_updates_90d = -2;
        let outcome = compute_scores(&[weird, steady(10, 0, 0)], &HashMap::new(), now());
        for score in &outcome.scores {
            assert!(score.hot_score >= 0.0);
            assert!(score.rising_score >= 0.0);
            assert!(score.download_velocity >= 0.0);
        }
    }

    #[test]
    fn recalculation_without_new_data_is_stable() {
        let items: Vec<ItemStats> = (1..=5).map(|i| steady(i, 1_000 * i, 100 * i)).collect();
        let first = compute_scores(&items, &HashMap::new(), now());

        let prior: HashMap<i64, PriorState> = first
            .scores
            .iter()
            .map(|s| {
                (
                    s.item_id,
                    PriorState {
                        first_hot_at: s.first_hot_at,
                        first_rising_at: s.first_rising_at,
                    },
                )
            })
            .collect();
        let second = compute_scores(&items, &prior, now());
        assert_eq!(first.scores, second.scores);
        assert_eq!(first.ranks, second.ranks);
    }

    #[test]
    fn existing_age_decays_score() {
        let items = vec![steady(1, 5_000, 500)];
        let fresh = compute_scores(&items, &HashMap::new(), now());
        let mut prior = HashMap::new();
        let entered = now() - Duration::hours(12);
        prior.insert(
            1,
            PriorState {
                first_hot_at: Some(entered),
                first_rising_at: None,
            },
        );
        let aged = compute_scores(&items, &prior, now());
        assert!(aged.scores[0].hot_score < fresh.scores[0].hot_score);
        assert_eq!(aged.scores[0].first_hot_at, Some(entered));
    }

    #[test]
    fn dropping_out_of_top_twenty_clears_age() {
        // 21 hot items; item 21 has the weakest signal.
        let mut items: Vec<ItemStats> =
            (1..=20).map(|i| steady(i, 20_000, 2_000 + i * 10)).collect();
        items.push(steady(21, 20_000, 10));

        let entered = now() - Duration::hours(30);
        let mut prior = HashMap::new();
        prior.insert(
            21,
            PriorState {
                first_hot_at: Some(entered),
                first_rising_at: None,
            },
        );

        let outcome = compute_scores(&items, &prior, now());
        let dropped = outcome.scores.iter().find(|s| s.item_id == 21).unwrap();
        assert!(dropped.hot_score > 0.0);
        assert!(dropped.first_hot_at.is_none());
        assert_eq!(outcome.ranked(Leaderboard::Hot).count(), 21);

        // Re-entering later starts from zero age.
        let mut comeback = items.clone();
        comeback[20] = steady(21, 20_000, 50_000);
        let prior_after: HashMap<i64, PriorState> = outcome
            .scores
            .iter()
            .map(|s| {
                (
                    s.item_id,
                    PriorState {
                        first_hot_at: s.first_hot_at,
                        first_rising_at: s.first_rising_at,
                    },
                )
            })
            .collect();
        let later = now() + Duration::hours(5);
        let again = compute_scores(&comeback, &prior_after, later);
        let back = again.scores.iter().find(|s| s.item_id == 21).unwrap();
        assert_eq!(back.first_hot_at, Some(later));
    }

    #[test]
    fn eligible_items_always_score() {
        // No growth and no recent releases.
        let flat = |item_id, downloads| ItemStats {
            item_id,
            download_count: downloads,
            snapshots_24h: 10,
            snapshots_7d: 10,
            ..Default::default()
        };
        let items = vec![
            flat(1, 600),
            flat(2, 100),
            flat(3, 20),
            flat(4, 20_000),
            flat(5, 10_000),
        ];
        let outcome = compute_scores(&items, &HashMap::new(), now());
        let hot_top: HashSet<i64> = outcome
            .ranked(Leaderboard::Hot)
            .take(LEADERBOARD_SIZE)
            .map(|r| r.item_id)
            .collect();
        for (stats, score) in items.iter().zip(&outcome.scores) {
            assert_eq!(
                score.hot_score > 0.0,
                is_hot_eligible(stats.download_count),
                "hot score for item {}",
                stats.item_id
            );
            let rising_eligible =
                is_rising_eligible(stats.download_count) && !hot_top.contains(&stats.item_id);
            assert_eq!(
                score.rising_score > 0.0,
                rising_eligible,
                "rising score for item {}",
                stats.item_id
            );
        }
        assert_eq!(outcome.ranked(Leaderboard::Hot).count(), 3);
        assert_eq!(
            outcome
                .ranked(Leaderboard::Rising)
                .map(|r| r.item_id)
                .collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    fn ranks_are_dense_and_ordered() {
        let items: Vec<ItemStats> = (1..=4).map(|i| steady(i, 1_000, 100 * i)).collect();
        let outcome = compute_scores(&items, &HashMap::new(), now());
        let hot: Vec<&RankEntry> = outcome.ranked(Leaderboard::Hot).collect();
        assert_eq!(hot.len(), 4);
        assert_eq!(hot[0].item_id, 4);
        assert_eq!(
            hot.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(hot.windows(2).all(|w| w[0].score >= w[1].score));
    }

    // -- Against the store --

    fn open_db() -> Db {
        let db = Db::open_in_memory().expect("open in-memory db");
        db.init().expect("init schema");
        db
    }

    fn record(id: i64, downloads: i64) -> ItemRecord {
        ItemRecord {
            id,
            name: format!("Addon {}", id),
            slug: format!("addon-{}", id),
            author: None,
            categories: vec![],
            logo_url: None,
            game_versions: vec![],
            download_count: downloads,
            thumbs_up_count: downloads / 100,
            popularity_rank: None,
            rating: None,
            latest_file_date: None,
        }
    }

    /// Ten hourly snapshots ending at `end`, gaining 100 downloads an hour.
    fn write_hourly(db: &mut Db, id: i64, start_downloads: i64, end: DateTime<Utc>) {
        for h in (0..10).rev() {
            let rec = record(id, start_downloads + (9 - h) * 100);
            db.write_snapshot(&rec, end - Duration::hours(h))
                .expect("write snapshot");
        }
    }

    fn rank_rows(db: &Db) -> Vec<(i64, String, i64, f64)> {
        let mut stmt = db
            .conn()
            .prepare("SELECT item_id, category, rank, score FROM rank_history ORDER BY id")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .expect("query rank history")
            .collect::<Result<Vec<_>, _>>()
            .expect("collect rank history");
        rows
    }

    #[test]
    fn rerun_without_new_snapshots_keeps_stored_state() {
        let mut db = open_db();
        write_hourly(&mut db, 1, 5_000, now());
        write_hourly(&mut db, 2, 800, now());
        write_hourly(&mut db, 3, 60, now());

        let first = run(&mut db, now()).unwrap();
        let before: Vec<Option<TrendingScore>> =
            (1..=3).map(|id| db.trending_score(id).unwrap()).collect();
        let ranks_before = rank_rows(&db);
        assert_eq!(first.scored, 3);
        assert!(!ranks_before.is_empty());

        let second = run(&mut db, now()).unwrap();
        let after: Vec<Option<TrendingScore>> =
            (1..=3).map(|id| db.trending_score(id).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(first.hot_ranked, second.hot_ranked);
        assert_eq!(first.rising_ranked, second.rising_ranked);

        let ranks_after = rank_rows(&db);
        assert_eq!(ranks_after.len(), ranks_before.len() * 2);
        assert_eq!(ranks_after[ranks_before.len()..], ranks_before[..]);
    }

    #[test]
    fn returning_item_starts_with_fresh_age() {
        let mut db = open_db();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        write_hourly(&mut db, 1, 5_000, t1);
        write_hourly(&mut db, 2, 2_000, t1);
        run(&mut db, t1).unwrap();
        assert_eq!(db.trending_score(1).unwrap().unwrap().first_hot_at, Some(t1));

        let gone = t1 + Duration::hours(1);
        db.mark_inactive_except(&[2].into_iter().collect(), gone)
            .unwrap();
        run(&mut db, gone).unwrap();
        let inactive = db.trending_score(1).unwrap().unwrap();
        assert_eq!(inactive.hot_score, 0.0);
        assert_eq!(inactive.rising_score, 0.0);
        assert!(inactive.first_hot_at.is_none());
        assert!(inactive.first_rising_at.is_none());
        assert!(db
            .leaderboard(Leaderboard::Hot, 20, gone)
            .unwrap()
            .iter()
            .all(|r| r.item_id != 1));

        let back = t1 + Duration::days(3);
        db.write_snapshot(&record(1, 6_500), back).unwrap();
        run(&mut db, back).unwrap();
        let returned = db.trending_score(1).unwrap().unwrap();
        assert!(returned.hot_score > 0.0);
        assert_eq!(returned.first_hot_at, Some(back));
        // Item 2 stayed active the whole time.
        assert_eq!(db.trending_score(2).unwrap().unwrap().first_hot_at, Some(t1));
    }

    #[test]
    fn rank_delta_display() {
        assert_eq!(RankDelta::between(3, None).to_string(), "new");
        assert_eq!(RankDelta::between(3, Some(3)).to_string(), "=");
        assert_eq!(RankDelta::between(2, Some(5)).to_string(), "+3");
        assert_eq!(RankDelta::between(6, Some(4)).to_string(), "-2");
    }

    #[test]
    fn leaderboard_parses() {
        assert_eq!("HOT".parse::<Leaderboard>(), Ok(Leaderboard::Hot));
        assert_eq!(" rising ".parse::<Leaderboard>(), Ok(Leaderboard::Rising));
        assert!("new".parse::<Leaderboard>().is_err());
    }
}
