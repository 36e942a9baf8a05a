//! Insider Runner
//!
//! Imports daily Polymarket holder snapshots and prints wallet, score, flow
//! and consensus reports as JSON.

mod importer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use polymarket_core::config::AppConfig;
use polymarket_core::db::{self, SqliteSnapshotStore};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "insider-runner")]
#[command(about = "Daily wallet flow and consensus analytics for Polymarket")]
struct Cli {
    /// Configuration file (defaults to ./insider.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run date as YYYY-MM-DD (defaults to run.date_override, then today)
    #[arg(short, long, global = true)]
    date: Option<String>,

    /// Write the JSON report to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a markets file and a holders file as the run's snapshot
    Import {
        /// Markets JSON payload
        #[arg(long)]
        markets: PathBuf,

        /// Holders JSON payload
        #[arg(long)]
        holders: PathBuf,
    },

    /// Rank the run's wallets
    Metrics,

    /// Wallet flow against the prior run
    Flow,

    /// Multi-wallet consensus over the lookback window
    Consensus,

    /// Market and wallet scores of the run's snapshot
    Scores,

    /// All reports, persisting metrics, scores and the run status
    Run,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "insider_runner=info,wallet_analytics=info,polymarket_core=info".into()
    });

    // Logs go to stderr so stdout stays valid JSON.
    let fmt_layer = if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn emit<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let run_date: NaiveDate = config.run.resolve_run_date(cli.date.as_deref())?;
    info!(run_date = %run_date, timezone = %config.run.timezone, "Starting insider runner");

    let pool = db::create_pool(&config.database)
        .await
        .with_context(|| format!("failed to open {}", config.database.url))?;
    db::run_migrations(&pool).await?;
    let store = SqliteSnapshotStore::new(pool);
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Import { markets, holders } => {
            let summary =
                importer::import_snapshot(&store, run_date, &config, &markets, &holders).await?;
            emit(&summary, output)?;
        }
        Commands::Metrics => {
            let report = wallet_analytics::wallet_report(&store, run_date, &config).await?;
            emit(&report, output)?;
        }
        Commands::Flow => {
            let report = wallet_analytics::flow_report(&store, run_date, &config).await?;
            emit(&report, output)?;
        }
        Commands::Consensus => {
            let report = wallet_analytics::consensus_report(&store, run_date, &config).await?;
            emit(&report, output)?;
        }
        Commands::Scores => {
            let report = wallet_analytics::score_report(&store, run_date, &config).await?;
            emit(&report, output)?;
        }
        Commands::Run => {
            let report = wallet_analytics::run_daily(&store, run_date, &config).await?;
            emit(&report, output)?;
        }
    }

    Ok(())
}
