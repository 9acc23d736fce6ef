//! Error types for curse_fetcher
//!
//! This module defines error types for all components of the application.
//! Every error carries a stable category for classification, and
//! cancellation is modeled as its own top-level variant so it can be
//! told apart from ordinary failure everywhere.

use std::path::PathBuf;

use thiserror::Error;

use crate::app::version::AppVersion;

/// URL classification and validation errors
#[derive(Error, Debug)]
pub enum CurseError {
    /// URL does not look like a CurseForge addon page
    #[error("Not a valid CurseForge addon page URL: {url}")]
    InvalidPageUrl { url: String },

    /// URL does not look like a Curse CDN zip download
    #[error("Not a valid Curse CDN download URL: {url}")]
    InvalidDownloadUrl { url: String },
}

/// Download and HTTP transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Response carries no usable content length (required for progress)
    #[error("Server response declares no usable content length")]
    MissingContentLength,

    /// Received byte count differs from the declared content length
    #[error("Received {received} bytes but content length declared {expected}")]
    LengthMismatch { received: u64, expected: u64 },

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Archive validation and extraction errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Archive failed structural validation
    #[error("Archive is corrupted or empty: {path}")]
    Corrupted { path: PathBuf },

    /// Zip format error during extraction
    #[error("Zip extraction failed")]
    Zip(#[from] zip::result::ZipError),

    /// Blocking archive task failed to run to completion
    #[error("Archive task failed")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error during archive operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Version cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Index file exists but cannot be parsed
    #[error("Version cache index is corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// Index entry references a blob that is not in the blob store
    #[error("Version cache index references missing archive blob: {file}")]
    MissingBlob { file: String },

    /// Index contains more than one entry for the same addon
    #[error("Version cache index contains multiple entries for addon: {addon}")]
    DuplicateEntry { addon: String },

    /// Reuse was requested for an addon without a valid entry
    #[error("No valid version cache entry for addon: {addon}")]
    EntryNotFound { addon: String },

    /// JSON error while reading or writing the index
    #[error("JSON error in version cache index")]
    Json(#[from] serde_json::Error),

    /// I/O error during cache operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Download URL resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Scraper API returned error status
    #[error("Scraper API returned HTTP {status}")]
    ServerError { status: u16 },

    /// Scraper API response was not the expected JSON shape
    #[error("Scraper API returned invalid JSON: {reason}")]
    InvalidJson { reason: String },

    /// No download URL could be resolved for an addon
    #[error("No download URL resolved for addon: {addon}")]
    Unresolved { addon: String },
}

/// Self-update errors
#[derive(Error, Debug)]
pub enum UpdateError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Release feed returned error status
    #[error("Release feed returned HTTP {status}")]
    ServerError { status: u16 },

    /// Release feed response was not the expected JSON shape
    #[error("Release feed returned invalid content: {reason}")]
    InvalidFeed { reason: String },

    /// Release tag is not a parsable version
    #[error("Release tag is not a parsable version: {tag}")]
    InvalidTag { tag: String },

    /// First release asset is not a zip download URL
    #[error("Release asset URL is not a zip download: {url}")]
    InvalidAssetUrl { url: String },

    /// Staged update does not contain the expected executable
    #[error("Staged update is missing expected executable: {file}")]
    MissingExecutable { file: String },

    /// Staged executable is older than the installed one
    #[error("Staged version {staged} is older than installed version {installed}")]
    VersionRegression {
        staged: AppVersion,
        installed: AppVersion,
    },

    /// Executable version could not be determined
    #[error("Could not determine executable version: {reason}")]
    VersionProbe { reason: String },

    /// I/O error during update operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading or writing configuration
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// URL classification error
    #[error(transparent)]
    Curse(#[from] CurseError),

    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Archive error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Version cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// URL resolution error
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Self-update error
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The operation was canceled by the caller
    #[error("Operation was canceled")]
    Canceled,

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// True when this error is a cancellation, not an ordinary failure.
    ///
    /// Cancellation is propagated as-is, never wrapped and never logged
    /// as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Canceled)
    }

    /// Get error category for logging and classification
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Curse(_) => "validation",
            AppError::Transfer(_) => "transfer",
            AppError::Archive(ArchiveError::Corrupted { .. }) => "integrity",
            AppError::Archive(_) => "archive",
            AppError::Cache(CacheError::EntryNotFound { .. }) => "cache",
            AppError::Cache(_) => "consistency",
            AppError::Resolve(_) => "resolve",
            AppError::Update(UpdateError::VersionRegression { .. }) => "version-regression",
            AppError::Update(_) => "update",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Canceled => "canceled",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Archive result type alias
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Resolve result type alias
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Update result type alias
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_ordinary_failure() {
        let canceled = AppError::Canceled;
        assert!(canceled.is_cancellation());
        assert_eq!(canceled.category(), "canceled");

        let failure = AppError::Transfer(TransferError::MissingContentLength);
        assert!(!failure.is_cancellation());
    }

    #[test]
    fn test_error_categories_are_stable() {
        let integrity = AppError::Archive(ArchiveError::Corrupted {
            path: PathBuf::from("dbm.zip"),
        });
        assert_eq!(integrity.category(), "integrity");

        let consistency = AppError::Cache(CacheError::MissingBlob {
            file: "dbm.zip".to_string(),
        });
        assert_eq!(consistency.category(), "consistency");

        let validation = AppError::Curse(CurseError::InvalidPageUrl {
            url: "https://example.com".to_string(),
        });
        assert_eq!(validation.category(), "validation");
    }
}
