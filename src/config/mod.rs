use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Fetcher + row normalisation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Listing page URL. `{make}` is replaced by the lowercased make.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Origin prepended to root-relative links.
    #[serde(default = "default_base_origin")]
    pub base_origin: String,

    /// "No photo" image; rows pointing at it are dropped.
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,

    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt (total attempts = max_retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referrer")]
    pub referrer: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Sync configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// The one make this installation scrapes.
    #[serde(default = "default_make")]
    pub make: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_target_url() -> String {
    "http://proxy.alpha-host.xyz/lv/transport/cars/{make}/".to_string()
}
fn default_base_origin() -> String {
    "http://proxy.alpha-host.xyz".to_string()
}
fn default_placeholder_image() -> String {
    "http://proxy2.alpha-host.xyz/img/buy/auto.lv.gif".to_string()
}
fn default_timeout_ms() -> u64 {
    25_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36"
        .to_string()
}
fn default_referrer() -> String {
    "https://www.google.com/".to_string()
}
fn default_accept_language() -> String {
    "lv-LV,lv;q=0.9,en;q=0.8".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/listings.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_make() -> String {
    "BMW".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            base_origin: default_base_origin(),
            placeholder_image: default_placeholder_image(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            referrer: default_referrer(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { make: default_make() }
    }
}

impl ScraperConfig {
    /// Listing page URL for `make`.
    pub fn target_url_for(&self, make: &str) -> String {
        self.target_url.replace("{make}", &make.trim().to_lowercase())
    }

    /// Base origin without a trailing slash.
    pub fn origin(&self) -> &str {
        self.base_origin.trim_end_matches('/')
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
            .add_source(config::Environment::with_prefix("CLASSIFIEDS").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scraper.timeout_ms, 25_000);
        assert_eq!(cfg.scraper.max_retries, 2);
        assert_eq!(cfg.sync.make, "BMW");
        assert!(cfg.storage.run_migrations);
    }

    #[test]
    fn test_target_url_for_substitutes_lowercased_make() {
        let cfg = ScraperConfig {
            target_url: "https://example.test/cars/{make}/".into(),
            ..ScraperConfig::default()
        };
        assert_eq!(cfg.target_url_for(" BMW "), "https://example.test/cars/bmw/");
    }

    #[test]
    fn test_origin_strips_trailing_slash() {
        let cfg = ScraperConfig {
            base_origin: "https://example.test/".into(),
            ..ScraperConfig::default()
        };
        assert_eq!(cfg.origin(), "https://example.test");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .set_override("scraper.timeout_ms", 5000)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.scraper.timeout_ms, 5000);
        assert_eq!(cfg.scraper.max_retries, 2);
        assert_eq!(cfg.sync.make, "BMW");
    }
}
