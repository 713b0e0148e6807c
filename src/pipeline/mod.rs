//! Sync orchestrator: fetch → extract rows → normalise → dedup → score → store.
//!
//! ## Ordering precondition
//!
//! The source lists newest listings first. The scan therefore stops at the
//! first row whose external id is already stored and assumes everything below
//! it is known too. If the source breaks that order (a stale listing shows up
//! above a fresh one) the fresh listings below it are missed for this run;
//! they are picked up on a later run only once they rise above every known row.
//!
//! Callers must not run two syncs for the same make at once: the id lookup and
//! the insert are separate statements. The unique `external_id` column turns a
//! lost race into a store error rather than a duplicate row.

use crate::config::{AppConfig, ScraperConfig};
use crate::models::SyncResult;
use crate::scraper::cleaner::{normalise_make, row_to_listing};
use crate::scraper::http_client::{FetchError, HttpClient};
use crate::scraper::parsers::ListingSelectors;
use crate::scraper::PageSource;
use crate::storage::{ListingStore, Repository};
use crate::valuation;
use anyhow::{Context, Result};
use chrono::Utc;
use scraper::Html;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Walks the rows of one fetched page against a store.
pub struct Scanner {
    selectors: ListingSelectors,
    origin: String,
    placeholder_image: String,
}

impl Scanner {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            selectors: ListingSelectors::new()?,
            origin: config.origin().to_string(),
            placeholder_image: config.placeholder_image.clone(),
        })
    }

    /// Scan `doc` in document order, inserting new listings until the first
    /// already-stored one.
    ///
    /// `parsed` counts every row with a description link, including rows
    /// later dropped for a missing id or a placeholder image.
    pub fn scan(&self, doc: &Html, make: &str, store: &dyn ListingStore) -> Result<SyncResult> {
        let now = Utc::now().naive_utc();
        let mut result = SyncResult::default();

        for node in self.selectors.rows(doc) {
            result.parsed += 1;

            let raw = self.selectors.extract_row(&node, &self.origin);
            let Some(mut listing) = row_to_listing(make, raw, now) else {
                debug!("Row {} has no usable id, skipping", result.parsed);
                continue;
            };

            if !store.find_by_external_id(&listing.external_id)?.is_empty() {
                info!("{} is already stored, stopping scan", listing.external_id);
                result.stopped_on_existing = true;
                break;
            }

            if listing.image_url == self.placeholder_image {
                debug!("{} has no photo, skipping", listing.external_id);
                continue;
            }

            listing.mark = valuation::score(&listing, store)?;
            store.save(&listing)?;
            result.inserted += 1;

            debug!(
                "+ {} {} {} | {} km | {:.2} | mark {:.1}",
                listing.external_id, listing.model, listing.year,
                listing.mileage_km, listing.price, listing.mark,
            );
        }

        Ok(result)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: ScraperConfig,
    source: Box<dyn PageSource>,
    scanner: Scanner,
    repo: Repository,
}

impl Pipeline {
    /// Open storage and build the HTTP fetcher from `config`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let repo = Repository::open(&config.storage.db_path).context("Failed to open DuckDB")?;
        if config.storage.run_migrations {
            repo.run_migrations()?;
        }
        let client = HttpClient::new(&config.scraper).context("Failed to build fetcher")?;
        Self::with_source(config.scraper.clone(), Box::new(client), repo)
    }

    pub fn with_source(
        config: ScraperConfig,
        source: Box<dyn PageSource>,
        repo: Repository,
    ) -> Result<Self> {
        Ok(Self {
            scanner: Scanner::new(&config)?,
            config,
            source,
            repo,
        })
    }

    #[cfg(test)]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Fetch the listing page for `make` and store every new listing on it.
    pub async fn sync(&self, make: &str) -> Result<SyncResult, SyncError> {
        let make = normalise_make(make);
        let url = self.config.target_url_for(&make);

        let run_id = self
            .repo
            .begin_sync_run(&make)
            .inspect_err(|e| warn!("Could not record sync run: {:#}", e))
            .ok();

        let outcome = self.fetch_and_scan(&make, &url).await;

        if let Some(run_id) = run_id {
            let error = outcome.as_ref().err().map(|e| e.to_string());
            if let Err(e) = self
                .repo
                .finish_sync_run(run_id, outcome.as_ref().ok(), error.as_deref())
            {
                warn!("Could not close sync run {}: {:#}", run_id, e);
            }
        }

        if let Ok(result) = &outcome {
            info!(
                "{}: parsed {}, inserted {}{}",
                make,
                result.parsed,
                result.inserted,
                if result.stopped_on_existing { " (stopped on a known listing)" } else { "" },
            );
        }

        outcome
    }

    async fn fetch_and_scan(&self, make: &str, url: &str) -> Result<SyncResult, SyncError> {
        info!("Fetching {} listings from {}", make, url);
        let body = self.source.fetch_page(url).await?;

        let doc = Html::parse_document(&body);
        Ok(self.scanner.scan(&doc, make, &self.repo)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
