//! Pipeline orchestrator: ties loader → scraper → storage together.
//!
//! ## Stages
//!
//! 1. `fetch_stage()`: roll numbers → listing URLs → raw HTML, checkpointed
//!    to `pipeline.fetched_path`.
//! 2. `parse_stage()`: listing and detail pages → structured payloads, with
//!    detail pages followed up to `pipeline.detail_cap` per listing.
//!    Checkpointed to `pipeline.parsed_path`.
//! 3. `store_stage()`: one transaction per batch. Re-running converges:
//!    every entity is keyed, so nothing is duplicated.

use crate::config::AppConfig;
use crate::loader::{listing_urls, load_roll_numbers, write_json};
use crate::models::{FetchBatch, ParsedBatch, ParsedPage};
use crate::scraper::http_client::HttpClient;
use crate::scraper::parsers::parse_appeal_detail;
use crate::scraper::{AppealScraper, PageSource};
use crate::storage::{Repository, StoreStats};
use anyhow::{Context, Result};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Listing,
    Detail,
    Unknown,
}

impl PageKind {
    pub fn of(url: &str) -> Self {
        if url.contains("/Default?") {
            PageKind::Listing
        } else if url.contains("/ComplaintDetail?") {
            PageKind::Detail
        } else {
            PageKind::Unknown
        }
    }
}

/// Parse every successfully fetched page. Failed fetches are left out.
pub async fn parse_batch<S: PageSource>(scraper: &AppealScraper<S>, fetched: &FetchBatch) -> ParsedBatch {
    let mut parsed = ParsedBatch::new();

    for (url, result) in fetched {
        let html = match result.clone().into_result() {
            Ok(html) => html,
            Err(e) => {
                error!("Skipping parsing for {} due to fetch failure: {}", url, e);
                continue;
            }
        };

        info!("Parsing content from {}", url);
        let page = match PageKind::of(url) {
            PageKind::Listing => scraper.scrape_listing(&html).await,
            PageKind::Detail => parse_appeal_detail(&html).into(),
            PageKind::Unknown => ParsedPage::failed("Unknown page type"),
        };
        parsed.insert(url.clone(), page);
    }

    parsed
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn http_client(&self) -> Result<HttpClient> {
        HttpClient::new(&self.config.scraper).context("Failed to build HTTP client")
    }

    pub async fn fetch_stage(&self) -> Result<FetchBatch> {
        let rolls = load_roll_numbers(&self.config.pipeline.roll_numbers_csv)?;
        let urls = listing_urls(&self.config.scraper.listing_url_prefix, &rolls);
        if urls.is_empty() {
            warn!("No URLs generated. Check the roll number CSV and listing URL prefix.");
        }

        info!("Fetching content from {} URLs", urls.len());
        let fetched = self.http_client()?.fetch_all(&urls).await;

        write_json(&self.config.pipeline.fetched_path, &fetched)?;
        info!("Results saved to {:?}", self.config.pipeline.fetched_path);
        Ok(fetched)
    }

    pub async fn parse_stage(&self, fetched: &FetchBatch, fetch_details: bool) -> Result<ParsedBatch> {
        let scraper = AppealScraper::new(
            self.http_client()?,
            self.config.scraper.base_url(),
            fetch_details,
            self.config.pipeline.detail_cap,
        );

        let parsed = parse_batch(&scraper, fetched).await;

        write_json(&self.config.pipeline.parsed_path, &parsed)?;
        info!("Parsed results saved to {:?}", self.config.pipeline.parsed_path);
        Ok(parsed)
    }

    pub fn store_stage(&self, parsed: &ParsedBatch) -> Result<StoreStats> {
        let repo = Repository::open(&self.config.storage.db_path)?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }
        repo.store(parsed)
    }

    pub async fn run(&self) -> Result<PipelineStats> {
        info!("=== Step 1: Fetching listing pages ===");
        let fetched = self.fetch_stage().await?;

        info!("=== Step 2: Parsing ===");
        let parsed = self.parse_stage(&fetched, self.config.pipeline.fetch_details).await?;

        info!("=== Step 3: Storing ===");
        let store = self.store_stage(&parsed)?;

        let stats = PipelineStats {
            urls_fetched: fetched.len(),
            fetch_failures: fetched.values().filter(|r| !r.success).count(),
            pages_parsed: parsed.len(),
            parse_failures: parsed.values().filter(|p| matches!(p, ParsedPage::Failed { .. })).count(),
            store,
        };

        info!(
            "=== Done: {} URLs ({} failed) | {} parsed ({} errors) | {} appeals created, {} updated ===",
            stats.urls_fetched,
            stats.fetch_failures,
            stats.pages_parsed,
            stats.parse_failures,
            stats.store.appeals_created,
            stats.store.appeals_updated,
        );

        Ok(stats)
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub urls_fetched: usize,
    pub fetch_failures: usize,
    pub pages_parsed: usize,
    pub parse_failures: usize,
    pub store: StoreStats,
}
