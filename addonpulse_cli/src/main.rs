mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "addonpulse")]
#[command(about = "Track add-on download trends and leaderboards")]
struct Cli {
    /// Output format: table, json, csv, or markdown
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// SQLite database path
    #[arg(long, default_value = "addonpulse.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion cycle: fetch, snapshot, score, sweep
    Sync(commands::sync::SyncArgs),
    /// Show the hot or rising leaderboard
    Trending(commands::trending::TrendingArgs),
    /// Delete expired snapshots and rank history
    Sweep(commands::sweep::SweepArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("addonpulse=info".parse()?)
                .add_directive("curseforge_api=warn".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        "csv" => OutputFormat::Csv,
        "md" | "markdown" => OutputFormat::Markdown,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Sync(args) => commands::sync::run(args, &cli.db, &format).await?,
        Commands::Trending(args) => commands::trending::run(args, &cli.db, &format)?,
        Commands::Sweep(args) => commands::sweep::run(args, &cli.db, &format)?,
    }

    Ok(())
}
