//! GitHub release feed client
//!
//! The self-update check reads the repository's latest release: the tag
//! carries the available version, the first asset carries the download
//! URL of the release archive.

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::app::version::AppVersion;
use crate::constants::{curse, github};
use crate::errors::{UpdateError, UpdateResult};

/// Latest release as advertised by the feed
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    pub version: AppVersion,
    pub download_url: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    browser_download_url: String,
}

/// Fetch the latest release descriptor for `owner/repo`.
///
/// # Errors
///
/// Fails when the feed is unreachable, answers with a non-success status,
/// returns content that is not the expected JSON, or the first asset URL
/// is not a zip download.
pub async fn latest_release(client: &Client, owner: &str, repo: &str) -> UpdateResult<ReleaseInfo> {
    let url = format!("{}/repos/{owner}/{repo}/releases/latest", github::API_BASE_URL);

    let response = client
        .get(&url)
        .header(ACCEPT, github::ACCEPT_HEADER)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(UpdateError::ServerError {
            status: response.status().as_u16(),
        });
    }

    let raw = response.text().await?;
    release_info_from_json(&raw)
}

/// Parse and validate a release feed response body
pub(crate) fn release_info_from_json(raw: &str) -> UpdateResult<ReleaseInfo> {
    let release: Release = serde_json::from_str(raw).map_err(|e| UpdateError::InvalidFeed {
        reason: e.to_string(),
    })?;

    let version = AppVersion::parse(&release.tag_name).map_err(|_| UpdateError::InvalidTag {
        tag: release.tag_name.clone(),
    })?;

    let asset = release
        .assets
        .first()
        .ok_or_else(|| UpdateError::InvalidFeed {
            reason: "release carries no assets".to_string(),
        })?;

    let download_url = asset.browser_download_url.clone();
    let parsed = Url::parse(&download_url).map_err(|_| UpdateError::InvalidAssetUrl {
        url: download_url.clone(),
    })?;
    if !download_url.ends_with(curse::ARCHIVE_EXTENSION) {
        return Err(UpdateError::InvalidAssetUrl { url: download_url });
    }

    let file_name = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default()
        .to_string();
    if file_name.is_empty() {
        return Err(UpdateError::InvalidAssetUrl { url: download_url });
    }

    Ok(ReleaseInfo {
        version,
        download_url,
        file_name,
    })
}
