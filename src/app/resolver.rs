//! Addon download URL resolution
//!
//! CurseForge pages cannot be scraped directly from here, so a separate
//! scraper service keeps a slug -> direct download URL mapping current.
//! The trait boundary keeps the batch coordinator ignorant of where the
//! mapping comes from; the one real implementation talks to the scraper's
//! tiny JSON API.

use std::collections::HashMap;
use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{ResolveError, ResolveResult};

/// Resolution service mapping addon slugs to direct download URLs
pub trait ResolveDownloadUrls {
    /// Resolve every slug in `slugs` to a direct download URL.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Unresolved` when any requested slug has no
    /// known download URL after resolution.
    fn resolve(
        &self,
        slugs: &[String],
    ) -> impl Future<Output = ResolveResult<HashMap<String, String>>> + Send;
}

/// Client for the web scraper API
#[derive(Debug, Clone)]
pub struct ScraperApiClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ScraperResponse {
    addons: Vec<ScraperAddon>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScraperAddon {
    addon_slug: String,
    had_scrape: bool,
    #[serde(default)]
    download_url_final: Option<String>,
}

impl ScraperApiClient {
    /// Creates a new client against `base_url` using `token` for auth
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Fetch the full slug -> download URL mapping the API currently holds
    async fn fetch_all(&self) -> ResolveResult<HashMap<String, String>> {
        let url = format!("{}/get?token={}", self.base_url, self.token);
        debug!("Fetching download URL mapping from scraper API");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::ServerError {
                status: response.status().as_u16(),
            });
        }

        let raw = response.text().await?;
        parse_scraper_response(&raw)
    }

    /// Register slugs with the API so future scrape runs cover them
    async fn request_add(&self, slugs: &[String]) -> ResolveResult<()> {
        let url = format!(
            "{}/add?token={}&addons={}",
            self.base_url,
            self.token,
            slugs.join(",")
        );
        self.simple_get(&url).await
    }

    /// Trigger an immediate scrape of all registered addons
    async fn request_scrape(&self) -> ResolveResult<()> {
        let url = format!("{}/scrape?token={}", self.base_url, self.token);
        self.simple_get(&url).await
    }

    async fn simple_get(&self, url: &str) -> ResolveResult<()> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::ServerError {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

impl ResolveDownloadUrls for ScraperApiClient {
    async fn resolve(&self, slugs: &[String]) -> ResolveResult<HashMap<String, String>> {
        let mut known = self.fetch_all().await?;

        // Slugs the API has never seen need a registration and scrape
        // round before the mapping can contain them.
        if slugs.iter().any(|slug| !known.contains_key(slug)) {
            info!("Scraper API is missing some addons, requesting a scrape");
            self.request_add(slugs).await?;
            self.request_scrape().await?;
            known = self.fetch_all().await?;
        }

        let mut resolved = HashMap::with_capacity(slugs.len());
        for slug in slugs {
            let url = known.get(slug).ok_or_else(|| ResolveError::Unresolved {
                addon: slug.clone(),
            })?;
            resolved.insert(slug.clone(), url.clone());
        }
        Ok(resolved)
    }
}

/// Parse the scraper API response body into a slug -> URL map.
///
/// Entries that were never scraped or carry no final URL are skipped;
/// they simply are not part of the mapping yet.
fn parse_scraper_response(raw: &str) -> ResolveResult<HashMap<String, String>> {
    let response: ScraperResponse =
        serde_json::from_str(raw).map_err(|e| ResolveError::InvalidJson {
            reason: e.to_string(),
        })?;

    let mut mapping = HashMap::new();
    for addon in response.addons {
        if !addon.had_scrape {
            continue;
        }
        let slug = addon.addon_slug.trim().to_string();
        let url = addon
            .download_url_final
            .map(|u| u.trim().to_string())
            .unwrap_or_default();
        if !slug.is_empty() && !url.is_empty() {
            mapping.insert(slug, url);
        }
    }
    Ok(mapping)
}
