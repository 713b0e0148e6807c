mod config;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;
mod valuation;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::loader::{import_listings, read_import_file};
use crate::pipeline::Pipeline;
use crate::scraper::cleaner::normalise_make;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "classifieds-sync", about = "Classifieds listing sync and valuation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the listing page and store new listings (stops at the first known one)
    Sync {
        /// Make to sync (default: sync.make from config)
        #[arg(short, long)]
        make: Option<String>,
    },

    /// Import listings from a JSON file (array or single object)
    Import {
        file: PathBuf,
    },

    /// Show stored listings for a make, newest first
    Listings {
        #[arg(short, long)]
        make: Option<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations without syncing
    Migrate,
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "classifieds_sync=info,warn",
        1 => "classifieds_sync=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Sync { make } => {
            let make = make.unwrap_or_else(|| config.sync.make.clone());
            let _t = utils::Timer::start(format!("Sync {}", make));
            let result = Pipeline::new(&config)?.sync(&make).await?;
            println!(
                "Parsed {}, inserted {} new.{}",
                result.parsed,
                result.inserted,
                if result.stopped_on_existing { " Stopped at a known listing." } else { "" }
            );
        }

        Command::Import { file } => {
            let _t = utils::Timer::start("JSON import");
            let repo = open_repo(&config)?;
            let records = read_import_file(&file)?;
            let result = import_listings(&records, &repo)?;
            println!(
                "Imported {} item(s): {} inserted, {} updated.",
                result.received, result.inserted, result.updated
            );
        }

        Command::Listings { make, limit } => {
            let make = normalise_make(make.as_deref().unwrap_or(&config.sync.make));
            let repo = open_repo(&config)?;
            let listings = repo.list_by_make(&make, limit)?;
            if listings.is_empty() {
                println!("No {} listings — run `classifieds-sync sync` first.", make);
            } else {
                println!("{} {} listings:", listings.len(), make);
                for l in &listings {
                    println!(
                        "  {:>3.1}  {:<10} {:<6} {:>10} km  {:>10}  {}{}",
                        l.mark,
                        l.model,
                        l.year,
                        utils::fmt_number(l.mileage_km),
                        utils::fmt_price(l.price),
                        l.description_url,
                        if l.is_new { "  [new]" } else { "" },
                    );
                }
            }
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let listings = repo.listing_count()?;
            let makes = repo.make_count()?;
            let last = repo.last_sync_run()?;
            println!("─────────────────────────────────");
            println!("  Classifieds — Database Stats");
            println!("─────────────────────────────────");
            println!("  Listings : {}", utils::fmt_number(listings));
            println!("  Makes    : {}", utils::fmt_number(makes));
            match last {
                Some(run) => {
                    println!("  Last sync: #{} {} at {} ({})", run.id, run.make, run.started_at, run.status);
                    if let Some(finished) = run.finished_at {
                        println!("             finished {}", finished);
                    }
                    println!(
                        "             parsed {}, inserted {}{}",
                        run.parsed,
                        run.inserted,
                        run.error_msg.map(|e| format!(", error: {}", e)).unwrap_or_default()
                    );
                    if run.stopped_on_existing == Some(true) {
                        println!("             stopped at a known listing");
                    }
                }
                None => println!("  Last sync: —"),
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
