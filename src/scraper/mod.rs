pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::models::{AppealStub, DetailOutcome, FetchResult, ParsedPage};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{parse_appeal_detail, parse_listing_page};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Anything that can hand back a page body for a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

// ── Traversal ─────────────────────────────────────────────────────────────────

/// Parses listing pages and follows appeal links to their detail pages.
pub struct AppealScraper<S = HttpClient> {
    source: S,
    base_url: Option<Url>,
    fetch_details: bool,
    detail_cap: usize,
}

impl<S: PageSource> AppealScraper<S> {
    pub fn new(source: S, base_url: Option<Url>, fetch_details: bool, detail_cap: usize) -> Self {
        if fetch_details && base_url.is_none() {
            warn!("No base URL configured; appeal details will not be fetched");
        }
        Self { source, base_url, fetch_details, detail_cap }
    }

    /// Parse a listing page and, when enabled, attach detail pages to the
    /// first `detail_cap` appeals. Rows at or past the cap never keep details.
    pub async fn scrape_listing(&self, html: &str) -> ParsedPage {
        let mut page = match parse_listing_page(html) {
            ParsedPage::Listing(page) => page,
            other => return other,
        };

        if self.fetch_details {
            self.attach_details(&mut page.appeals).await;
            if page.appeals.len() > self.detail_cap {
                info!("Limiting appeal detail fetching to first {} appeals", self.detail_cap);
            }
            truncate_details(&mut page.appeals, self.detail_cap);
        }

        ParsedPage::Listing(page)
    }

    async fn attach_details(&self, appeals: &mut [AppealStub]) {
        let Some(base) = &self.base_url else { return };

        for appeal in appeals.iter_mut().take(self.detail_cap) {
            let Some(link) = appeal.appeal_link_mut() else { continue };
            if link.url.is_empty() {
                continue;
            }

            let outcome = match base.join(&link.url) {
                Ok(full) => self.fetch_detail(full.as_str()).await,
                Err(e) => DetailOutcome::failed(format!("bad detail URL {:?}: {}", link.url, e)),
            };

            if let DetailOutcome::Parsed(detail) = &outcome {
                debug!(
                    "Added details with {} fields to appeal {}",
                    detail.property_information.len() + detail.appellant_information.len(),
                    link.text
                );
            }
            link.details = Some(outcome);
        }
    }

    pub async fn fetch_detail(&self, url: &str) -> DetailOutcome {
        info!("Fetching appeal detail from {}", url);
        match self.source.fetch(url).await.into_result() {
            Ok(body) => parse_appeal_detail(&body),
            Err(e) => {
                warn!("Failed to fetch appeal details for {}: {}", url, e);
                DetailOutcome::failed(e)
            }
        }
    }
}

/// Strip `details` from every appeal at index `cap` or later, whatever put it there.
pub fn truncate_details(appeals: &mut [AppealStub], cap: usize) {
    for appeal in appeals.iter_mut().skip(cap) {
        if let Some(link) = appeal.appeal_link_mut() {
            link.details = None;
        }
    }
}
