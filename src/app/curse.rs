//! CurseForge URL classification
//!
//! Pure functions that recognize the two URL shapes this system deals with:
//! addon page URLs (human-facing listing pages, the configuration input)
//! and CDN direct download URLs (what the resolver hands back). Malformed
//! input yields `false` or an empty string, never an error; strict
//! validation happens at the call sites that require a particular shape.

use crate::constants::curse;

/// True iff `url` is a concrete addon page URL.
///
/// Example: `https://www.curseforge.com/wow/addons/deadly-boss-mods`
pub fn is_addon_page_url(url: &str) -> bool {
    let url = normalize(url);
    url.starts_with(curse::ADDON_PAGE_PREFIX) && !url.ends_with(curse::ADDON_LISTING_ROOT)
}

/// True iff `url` is a CDN direct download URL for an addon archive.
///
/// Example: `https://mediafilez.forgecdn.net/files/4485/146/DBM-10.0.35.zip`
pub fn is_download_url(url: &str) -> bool {
    let url = normalize(url);
    url.starts_with(curse::DOWNLOAD_URL_PREFIX) && url.ends_with(curse::ARCHIVE_EXTENSION)
}

/// Extract the addon slug (trailing path segment, lower-cased) from a page
/// URL. Returns an empty string when `url` is not an addon page URL.
pub fn addon_slug_from_page_url(url: &str) -> String {
    let url = normalize(url);
    if !is_addon_page_url(&url) {
        return String::new();
    }
    trailing_segment(&url).to_lowercase()
}

/// Extract the archive file name (trailing path segment, lower-cased) from
/// a download URL. Returns an empty string when `url` is not a download URL.
pub fn archive_file_from_download_url(url: &str) -> String {
    let url = normalize(url);
    if !is_download_url(&url) {
        return String::new();
    }
    trailing_segment(&url).to_lowercase()
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn trailing_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or_default()
}
