//! Configuration management for curse_fetcher
//!
//! One TOML file supplies everything the batch run needs: the addon page
//! URLs, the target directory the game reads addons from, and a handful of
//! option flags. Loading normalizes the addon list (trim, order-preserving
//! dedup) and validates every field before the rest of the application
//! sees it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::curse;
use crate::constants::{pipelines, scraper};
use crate::errors::{ConfigError, ConfigResult};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Addon page URLs to keep in sync
    pub addons: Vec<String>,
    /// Directory addons are extracted into (the game's AddOns folder)
    pub target_dir: PathBuf,
    /// Scratch directory base; system temp dir when absent
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Option flags
    #[serde(default)]
    pub options: Options,
}

/// Recognized option flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Check the release feed after every addon update run
    #[serde(default)]
    pub auto_update: bool,
    /// Upper bound on concurrently running addon pipelines
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
    /// Base URL of the scraper API resolving addon download URLs
    #[serde(default = "default_scraper_base_url")]
    pub scraper_base_url: String,
    /// Access token for the scraper API
    #[serde(default)]
    pub scraper_token: String,
}

fn default_concurrent_limit() -> usize {
    pipelines::DEFAULT_CONCURRENT_PIPELINES
}

fn default_scraper_base_url() -> String {
    scraper::DEFAULT_BASE_URL.to_string()
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_update: false,
            concurrent_limit: default_concurrent_limit(),
            scraper_base_url: default_scraper_base_url(),
            scraper_token: String::new(),
        }
    }
}

/// Commented starter configuration written by `config init`
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# curse-fetcher configuration

# Addon page URLs to keep in sync
addons = [
    # "https://www.curseforge.com/wow/addons/deadly-boss-mods",
]

# The game's AddOns directory (must exist)
target_dir = ""

# Scratch directory base; defaults to the system temp dir
# temp_dir = ""

[options]
# Check the release feed after every addon update run
auto_update = false

# Upper bound on concurrently running addon pipelines
concurrent_limit = 4

# Scraper API resolving addon download URLs
# scraper_base_url = "https://wowscrape.deno.dev"
# scraper_token = ""
"#;

impl AppConfig {
    /// Default configuration file location for the current OS
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("curse-fetcher").join("curse-fetcher.toml"))
    }

    /// Load and validate the configuration at `path`
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Write the commented starter configuration to `path`
    pub async fn write_default(path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, DEFAULT_CONFIG_TEMPLATE).await?;
        Ok(())
    }

    /// Scratch directory base for downloads and update staging
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("curse-fetcher"))
    }

    /// Trim addon URLs and drop duplicates, preserving order
    fn normalize(&mut self) {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(self.addons.len());
        for url in &self.addons {
            let url = url.trim().to_string();
            if url.is_empty() {
                continue;
            }
            if seen.insert(url.to_lowercase()) {
                unique.push(url);
            } else {
                warn!("Dropping duplicate addon URL: {url}");
            }
        }
        self.addons = unique;
    }

    /// Validate every field; only defensive existence checks on
    /// directories, the rest is shape validation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.addons.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "addons".to_string(),
                value: "[]".to_string(),
                reason: "at least one addon page URL is required".to_string(),
            });
        }

        for url in &self.addons {
            if !curse::is_addon_page_url(url) {
                return Err(ConfigError::InvalidValue {
                    field: "addons".to_string(),
                    value: url.clone(),
                    reason: "not a CurseForge addon page URL".to_string(),
                });
            }
        }

        if !self.target_dir.is_dir() {
            return Err(ConfigError::InvalidValue {
                field: "target_dir".to_string(),
                value: self.target_dir.display().to_string(),
                reason: "directory does not exist".to_string(),
            });
        }

        if self.options.concurrent_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "options.concurrent_limit".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
