use addonpulse_lib::retention::SweepSummary;
use addonpulse_lib::sync::SyncReport;
use addonpulse_lib::LeaderboardRow;
use anyhow::Result;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

#[derive(Tabled, Serialize)]
struct BoardRow {
    #[tabled(rename = "#")]
    #[serde(rename = "Rank")]
    rank: i64,
    #[tabled(rename = "Add-on")]
    #[serde(rename = "Add-on")]
    name: String,
    #[tabled(rename = "Author")]
    #[serde(rename = "Author")]
    author: String,
    #[tabled(rename = "Downloads")]
    #[serde(rename = "Downloads")]
    downloads: String,
    #[tabled(rename = "Per Hour")]
    #[serde(rename = "Per Hour")]
    velocity: String,
    #[tabled(rename = "Score")]
    #[serde(rename = "Score")]
    score: String,
    #[tabled(rename = "24h")]
    #[serde(rename = "24h")]
    change_24h: String,
    #[tabled(rename = "7d")]
    #[serde(rename = "7d")]
    change_7d: String,
}

#[derive(Tabled)]
struct StrategyRow {
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Pages")]
    pages: i64,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "New")]
    new_records: usize,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

// -- Row builders --

fn build_board_rows(rows: &[LeaderboardRow]) -> Vec<BoardRow> {
    rows.iter()
        .map(|r| BoardRow {
            rank: r.rank,
            name: r.name.clone(),
            author: r.author.clone().unwrap_or_default(),
            downloads: format_count(r.download_count),
            velocity: format!("{:.1}", r.download_velocity),
            score: format!("{:.4}", r.score),
            change_24h: r.change_24h.to_string(),
            change_7d: r.change_7d.to_string(),
        })
        .collect()
}

fn build_strategy_rows(report: &SyncReport) -> Vec<StrategyRow> {
    report
        .strategies
        .iter()
        .map(|s| StrategyRow {
            strategy: s.strategy.clone(),
            pages: s.pages,
            records: s.records,
            new_records: s.new_records,
            outcome: serde_json::to_value(s.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
        })
        .collect()
}

// -- Leaderboard output --

pub fn print_leaderboard_table(rows: &[LeaderboardRow]) {
    println!("{}", Table::new(build_board_rows(rows)));
}

pub fn print_leaderboard_markdown(rows: &[LeaderboardRow]) {
    let mut table = Table::new(build_board_rows(rows));
    table.with(Style::markdown());
    println!("{}", table);
}

pub fn print_leaderboard_csv(rows: &[LeaderboardRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for row in build_board_rows(rows) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

// -- Cycle summaries --

pub fn print_sync_report(report: &SyncReport) {
    println!("{}", Table::new(build_strategy_rows(report)));
    println!(
        "Items: {} seen, {} written, {} failed (error rate {:.2}%)",
        report.items_seen,
        report.success_count,
        report.error_count,
        report.error_rate * 100.0
    );
    match report.marked_inactive {
        Some(n) => println!("Marked inactive: {}", n),
        None => println!("Marked inactive: skipped"),
    }
    if let Some(t) = &report.trending {
        println!(
            "Trending: {} scored, {} skipped, {} hot, {} rising",
            t.scored, t.skipped, t.hot_ranked, t.rising_ranked
        );
    }
    if let Some(s) = &report.sweep {
        print_sweep_summary(s);
    }
    let r = &report.requests;
    println!(
        "Requests: {} made, {} ok, {} transient, {} fatal, {} short-circuited, {:.1}s backoff",
        r.requests_made,
        r.requests_succeeded,
        r.requests_transient,
        r.requests_fatal,
        r.short_circuited,
        r.total_backoff_secs
    );
    for failure in &report.failures {
        println!("FAILED: {}", failure);
    }
}

pub fn print_sweep_summary(summary: &SweepSummary) {
    println!(
        "Swept: {} snapshots in {} batch(es){}, {} rank history rows in {} batch(es){}",
        summary.snapshots.deleted,
        summary.snapshots.batches,
        if summary.snapshots.capped { " (capped)" } else { "" },
        summary.rank_history.deleted,
        summary.rank_history.batches,
        if summary.rank_history.capped { " (capped)" } else { "" },
    );
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_count(value: i64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}
