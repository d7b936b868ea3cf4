use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use url::Url;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Roll numbers are appended to this to form listing URLs; relative
    /// detail links resolve against it.
    #[serde(default)]
    pub listing_url_prefix: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per URL, not retries after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_courtesy_delay_ms")]
    pub courtesy_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_roll_numbers_csv")]
    pub roll_numbers_csv: PathBuf,

    #[serde(default = "default_fetched_path")]
    pub fetched_path: PathBuf,

    #[serde(default = "default_parsed_path")]
    pub parsed_path: PathBuf,

    #[serde(default = "default_true")]
    pub fetch_details: bool,

    #[serde(default = "default_detail_cap")]
    pub detail_cap: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_courtesy_delay_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "arb-scraper/0.1 (assessment appeal research)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/arb.duckdb")
}
fn default_roll_numbers_csv() -> PathBuf {
    PathBuf::from("data/roll-number.csv")
}
fn default_fetched_path() -> PathBuf {
    PathBuf::from("results.json")
}
fn default_parsed_path() -> PathBuf {
    PathBuf::from("parsed_results.json")
}
fn default_true() -> bool {
    true
}
fn default_detail_cap() -> usize {
    2
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            listing_url_prefix: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            courtesy_delay_ms: default_courtesy_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path(), run_migrations: true }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roll_numbers_csv: default_roll_numbers_csv(),
            fetched_path: default_fetched_path(),
            parsed_path: default_parsed_path(),
            fetch_details: true,
            detail_cap: default_detail_cap(),
        }
    }
}

impl ScraperConfig {
    /// Base for resolving relative detail links, if the prefix is a valid URL.
    pub fn base_url(&self) -> Option<Url> {
        Url::parse(&self.listing_url_prefix).ok()
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("ARB").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration, using defaults: {}", e);
            AppConfig::default()
        });

        // The roll-number tooling has always read the prefix from a bare URL variable.
        if app_cfg.scraper.listing_url_prefix.is_empty() {
            if let Ok(url) = std::env::var("URL") {
                app_cfg.scraper.listing_url_prefix = url;
            }
        }

        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_fill_in_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"scraper": {"max_retries": 5}, "pipeline": {"detail_cap": 10}}"#,
        )
        .unwrap();

        assert_eq!(cfg.scraper.max_retries, 5);
        assert_eq!(cfg.scraper.retry_delay_ms, 1000);
        assert_eq!(cfg.pipeline.detail_cap, 10);
        assert!(cfg.pipeline.fetch_details);
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/arb.duckdb"));
    }

    #[test]
    fn base_url_requires_valid_prefix() {
        let mut scraper = ScraperConfig::default();
        assert!(scraper.base_url().is_none());

        scraper.listing_url_prefix = "https://arb.example/Appeals/Default?RollNumber=".into();
        let joined = scraper.base_url().unwrap().join("ComplaintDetail?id=7").unwrap();
        assert_eq!(joined.as_str(), "https://arb.example/Appeals/ComplaintDetail?id=7");
    }
}
