//! Application constants for curse_fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// CurseForge URL contract constants
pub mod curse {
    /// Prefix of every addon page URL
    pub const ADDON_PAGE_PREFIX: &str = "https://www.curseforge.com/wow/addons/";

    /// The bare addon listing root (a page URL must name a concrete addon)
    pub const ADDON_LISTING_ROOT: &str = "/addons";

    /// Prefix of every CDN direct download URL
    pub const DOWNLOAD_URL_PREFIX: &str = "https://mediafilez.forgecdn.net/files/";

    /// File extension of every addon archive
    pub const ARCHIVE_EXTENSION: &str = ".zip";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "curse-fetcher/0.1 (WoW Addon Updater)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// File operation constants
pub mod files {
    use super::Duration;

    /// Extension of the backup copy made while applying a self-update
    pub const BACKUP_FILE_EXTENSION: &str = "bak";

    /// Version cache index file name
    pub const CACHE_INDEX_FILE: &str = "versions.json";

    /// Version cache blob directory name
    pub const CACHE_BLOB_DIR: &str = "blobs";

    /// Settling delay after filesystem mutations during self-update.
    /// OS buffering and AV scanning may still hold the file after the
    /// syscall returns; the delay is the only handle we have on that.
    pub const SETTLE_DELAY: Duration = Duration::from_millis(250);
}

/// Pipeline and concurrency configuration
pub mod pipelines {
    /// Default number of concurrently running addon pipelines
    pub const DEFAULT_CONCURRENT_PIPELINES: usize = 4;

    /// Buffer size of the per-batch addon progress channel
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

    /// Buffer size of the per-download transfer event channel
    pub const TRANSFER_EVENT_CAPACITY: usize = 32;
}

/// GitHub release feed constants for self-update
pub mod github {
    /// GitHub REST API base URL
    pub const API_BASE_URL: &str = "https://api.github.com";

    /// Repository owner of the application release feed
    pub const RELEASE_OWNER: &str = "curse-fetcher";

    /// Repository name of the application release feed
    pub const RELEASE_REPO: &str = "curse-fetcher";

    /// Accept header for the GitHub REST API
    pub const ACCEPT_HEADER: &str = "application/vnd.github+json";

    /// Maximum allowed restart delay in seconds
    pub const MAX_RESTART_DELAY_SECS: u32 = 10;
}

/// Web scraper API defaults (addon slug -> download URL resolution)
pub mod scraper {
    /// Default base URL of the scraper API
    pub const DEFAULT_BASE_URL: &str = "https://wowscrape.deno.dev";
}

// Re-export commonly used constants for convenience
pub use curse::{ADDON_PAGE_PREFIX, ARCHIVE_EXTENSION, DOWNLOAD_URL_PREFIX};
pub use files::{CACHE_BLOB_DIR, CACHE_INDEX_FILE, SETTLE_DELAY};
pub use http::USER_AGENT;
pub use pipelines::DEFAULT_CONCURRENT_PIPELINES;
