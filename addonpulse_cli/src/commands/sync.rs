//! The `sync` subcommand: run one ingestion cycle into SQLite.

use std::path::Path;

use addonpulse_lib::curseforge_api::Client;
use addonpulse_lib::{run_cycle, validation, Db, ResilientClient, Settings, SyncOptions};
use anyhow::{bail, Result};
use clap::Args;

use crate::output::{print_json, print_sync_report, OutputFormat};

/// Arguments for the `sync` subcommand.
#[derive(Args)]
pub struct SyncArgs {
    /// Only track add-ons with a file for this game version (e.g. 1.20.1)
    #[arg(long)]
    pub game_version: Option<String>,

    /// Page size for API pagination (1-50)
    #[arg(long, default_value = "50")]
    pub page_size: i64,

    /// Maximum pages per sort strategy
    #[arg(long, default_value = "200")]
    pub max_pages: i64,

    /// Comma-separated sort strategies in priority order
    #[arg(long, default_value = "popularity,last-updated,total-downloads")]
    pub strategies: String,
}

pub fn build_options(args: &SyncArgs, settings: &Settings) -> Result<SyncOptions> {
    Ok(SyncOptions {
        game_id: settings.game_id,
        strategies: validation::parse_strategies(&args.strategies)?,
        page_size: validation::validate_page_size(args.page_size)?,
        max_pages: validation::validate_max_pages(args.max_pages)?,
        game_version: args
            .game_version
            .as_deref()
            .map(validation::validate_game_version)
            .transpose()?,
        ..Default::default()
    })
}

pub async fn run(args: &SyncArgs, db_path: &Path, format: &OutputFormat) -> Result<()> {
    let settings = Settings::from_env();
    let api_key = settings.require_api_key()?;
    let options = build_options(args, &settings)?;

    let mut db = Db::open(db_path)?;
    db.init()?;

    eprintln!(
        "Starting sync into {} (env: {}, game {}, page cap {})",
        db_path.display(),
        settings.environment,
        options.game_id,
        options.page_cap()
    );

    let inner = Client::with_base_url(&settings.base_url, api_key)?;
    let client = ResilientClient::new(inner, settings.upstream.clone());
    let report = run_cycle(&client, &mut db, &options).await;

    match format {
        OutputFormat::Json => print_json(&report),
        _ => print_sync_report(&report),
    }

    if !report.is_success() {
        bail!("sync cycle failed: {}", report.failures.join("; "));
    }
    eprintln!(
        "Sync complete: {} items written in {:.1}s",
        report.success_count, report.duration_secs
    );
    Ok(())
}
