mod config;
mod engine;
mod error;
mod fetcher;
mod models;
mod notifier;
mod pipeline;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::storage::SnapshotStore;

#[derive(Parser)]
#[command(name = "southbound-etl", about = "Southbound Connect holdings ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch both feeds, reconcile, persist and notify (daily update mode)
    Run,

    /// Show snapshot statistics
    Stats,

    /// Export the persisted snapshot as CSV
    Export {
        /// Output file path
        #[arg(short, long, default_value = "data/southbound.csv")]
        out: PathBuf,
    },

    /// Apply schema migrations without running the pipeline
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "southbound_etl=info,warn",
        1 => "southbound_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            let started = Instant::now();
            let stats = Pipeline::new(config).run().await?;
            info!(
                "Run finished in {:.2?}: {} rows, {} changed, notified: {}",
                started.elapsed(),
                stats.rows_total,
                stats.rows_changed,
                stats.notified
            );
        }

        Command::Stats => {
            let store = SnapshotStore::open(&config.storage.db_path)?;
            let symbol = &config.engine.symbol;
            let rows = store.row_count(symbol)?;
            let (min, max) = store.date_range(symbol).unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  Southbound ETL — Snapshot");
            println!("─────────────────────────────────");
            println!("  Symbol   : {}", symbol);
            println!("  Rows     : {}", rows);
            println!("  From     : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To       : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Export { out } => {
            let store = SnapshotStore::open(&config.storage.db_path)?;
            match store.load(&config.engine.symbol)? {
                None => println!("No snapshot — run `southbound-etl run` first."),
                Some(rows) => {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut wtr = csv::Writer::from_path(&out)?;
                    for row in &rows {
                        wtr.serialize(row)?;
                    }
                    wtr.flush()?;
                    println!("Exported {} rows to {:?}", rows.len(), out);
                }
            }
        }

        Command::Migrate => {
            SnapshotStore::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
