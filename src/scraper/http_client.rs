use crate::config::ScraperConfig;
use crate::models::{FetchBatch, FetchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use super::PageSource;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: reqwest::StatusCode, url: String },
}

/// Pooled HTTP session. Connections live as long as the client and are
/// released when it is dropped.
pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    courtesy_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            // ASP.NET pages hand out a session cookie on first hit
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            courtesy_delay: Duration::from_millis(config.courtesy_delay_ms),
        })
    }

    /// GET with up to `max_retries` attempts and a fixed pause between them.
    /// Never errors: failures come back as an unsuccessful `FetchResult`.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let strategy = FixedInterval::new(self.retry_delay).take(self.max_retries as usize - 1);
        let mut attempt = 0u32;

        let result = Retry::start(strategy, || {
            attempt += 1;
            self.attempt(url, attempt)
        })
        .await;

        match result {
            Ok(body) => FetchResult::ok(body),
            Err(e) => {
                warn!("Giving up on {} after {} attempts: {}", url, self.max_retries, e);
                FetchResult::failed(e.to_string())
            }
        }
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<String, FetchError> {
        debug!("GET {} (attempt {}/{})", url, attempt, self.max_retries);

        let outcome = self.get_text(url).await;
        if let Err(e) = &outcome {
            warn!("Error fetching {} on attempt {}: {}", url, attempt, e);
        }
        outcome
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status, url: url.to_string() });
        }
        Ok(resp.text().await?)
    }

    /// Fetch every URL in order, pausing between requests whatever the outcome.
    pub async fn fetch_all(&self, urls: &[String]) -> FetchBatch {
        let mut results = FetchBatch::new();

        for (i, url) in urls.iter().enumerate() {
            if i > 0 {
                sleep(self.courtesy_delay).await;
            }
            results.insert(url.clone(), self.fetch(url).await);
        }

        let ok = results.values().filter(|r| r.success).count();
        info!("Fetch completed: {} successful, {} failed", ok, results.len() - ok);
        results
    }
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch(&self, url: &str) -> FetchResult {
        HttpClient::fetch(self, url).await
    }
}
