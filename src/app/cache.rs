//! Version cache for downloaded addon archives
//!
//! The cache answers one question: "is the exact version behind this
//! download URL already on disk?" It keeps a persisted index mapping each
//! addon to the (source URL, archive file name) pair it was last updated
//! from, next to a blob store holding a copy of every accepted archive.
//! The triple acts as a content-version fingerprint without hashing the
//! payload: the CDN issues a new URL and file name whenever an addon is
//! rebuilt, so triple equality means "identical version already held".
//!
//! The in-memory map is internally synchronized; pipelines query and
//! mutate it concurrently, while load and save are called once per batch
//! by the coordinator, which is the sole writer of the persisted state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::constants::files;
use crate::errors::{CacheError, CacheResult};

/// One persisted cache entry; at most one per addon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Addon slug the entry belongs to
    pub addon: String,
    /// Download URL the archive was fetched from
    pub source_url: String,
    /// Archive file name, also the blob file name in the blob store
    pub archive_file: String,
    /// When this entry last changed (UTC)
    pub changed_at: DateTime<Utc>,
}

/// Persisted index document
#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    entries: Vec<CacheEntry>,
}

/// Version cache: in-memory addon map backed by an index file and a
/// directory of archive blobs
#[derive(Debug)]
pub struct VersionCache {
    root: PathBuf,
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl VersionCache {
    /// Create a cache rooted at `root`. No I/O happens until `load`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(files::CACHE_INDEX_FILE)
    }

    fn blob_dir(&self) -> PathBuf {
        self.root.join(files::CACHE_BLOB_DIR)
    }

    fn blob_path(&self, archive_file: &str) -> PathBuf {
        self.blob_dir().join(archive_file)
    }

    /// Load the persisted index into memory.
    ///
    /// A missing index file leaves the cache empty and is not an error.
    /// Index and blob store must agree: every referenced blob has to be
    /// present, and no addon may appear twice, otherwise the load aborts
    /// with a consistency error.
    pub async fn load(&self) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.clear();

        let index_path = self.index_path();
        if !fs::try_exists(&index_path).await.unwrap_or(false) {
            debug!("No version cache index at {}", index_path.display());
            return Ok(());
        }

        let raw = fs::read(&index_path).await?;
        let index: CacheIndex =
            serde_json::from_slice(&raw).map_err(|e| CacheError::IndexCorrupted {
                reason: e.to_string(),
            })?;

        for entry in index.entries {
            if entry.addon.trim().is_empty()
                || entry.source_url.trim().is_empty()
                || entry.archive_file.trim().is_empty()
            {
                return Err(CacheError::IndexCorrupted {
                    reason: "entry with empty attribute".to_string(),
                });
            }

            let blob = self.blob_path(&entry.archive_file);
            if !fs::try_exists(&blob).await.unwrap_or(false) {
                return Err(CacheError::MissingBlob {
                    file: entry.archive_file,
                });
            }

            let addon = entry.addon.clone();
            if entries.insert(addon.clone(), entry).is_some() {
                return Err(CacheError::DuplicateEntry { addon });
            }
        }

        debug!("Loaded {} version cache entries", entries.len());
        Ok(())
    }

    /// Persist the in-memory entries, sorted by addon id, deterministically.
    pub async fn save(&self) -> CacheResult<()> {
        fs::create_dir_all(self.blob_dir()).await?;

        let entries = self.entries.read().await;
        let index = CacheIndex {
            // BTreeMap iteration order gives the addon-sorted output
            entries: entries.values().cloned().collect(),
        };

        let mut raw = serde_json::to_vec_pretty(&index)?;
        raw.push(b'\n');
        fs::write(self.index_path(), raw).await?;

        debug!("Saved {} version cache entries", index.entries.len());
        Ok(())
    }

    /// True iff an entry for `addon` matches the exact (url, file) pair
    /// and its blob is present in the blob store. Any mismatch, including
    /// a blob deleted out-of-band, means "not cached".
    pub async fn exists(&self, addon: &str, source_url: &str, archive_file: &str) -> bool {
        let entries = self.entries.read().await;
        let matches = entries
            .get(addon)
            .map(|entry| entry.source_url == source_url && entry.archive_file == archive_file)
            .unwrap_or(false);
        if !matches {
            return false;
        }
        drop(entries);

        fs::try_exists(self.blob_path(archive_file))
            .await
            .unwrap_or(false)
    }

    /// Accept a new version for `addon`: remember the (url, file) pair and
    /// copy the archive at `source_path` into the blob store.
    ///
    /// A call with values that already exactly match the valid entry is a
    /// no-op. A superseded blob is deleted best-effort; nothing reads it
    /// anymore.
    pub async fn record(
        &self,
        addon: &str,
        source_url: &str,
        archive_file: &str,
        source_path: &Path,
    ) -> CacheResult<()> {
        if self.exists(addon, source_url, archive_file).await {
            return Ok(());
        }

        let mut entries = self.entries.write().await;

        if let Some(previous) = entries.get(addon) {
            if previous.archive_file != archive_file {
                let stale = self.blob_path(&previous.archive_file);
                let _ = fs::remove_file(&stale).await;
            }
        }

        fs::create_dir_all(self.blob_dir()).await?;
        fs::copy(source_path, self.blob_path(archive_file)).await?;

        entries.insert(
            addon.to_string(),
            CacheEntry {
                addon: addon.to_string(),
                source_url: source_url.to_string(),
                archive_file: archive_file.to_string(),
                changed_at: Utc::now(),
            },
        );

        debug!("Recorded version cache entry for {addon} ({archive_file})");
        Ok(())
    }

    /// Copy the cached blob for `addon` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::EntryNotFound` when no valid entry exists;
    /// callers are expected to have checked `exists` first.
    pub async fn reuse(&self, addon: &str, destination: &Path) -> CacheResult<()> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(addon)
            .cloned()
            .ok_or_else(|| CacheError::EntryNotFound {
                addon: addon.to_string(),
            })?;
        drop(entries);

        let blob = self.blob_path(&entry.archive_file);
        if !fs::try_exists(&blob).await.unwrap_or(false) {
            return Err(CacheError::EntryNotFound {
                addon: addon.to_string(),
            });
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&blob, destination).await?;

        debug!("Reused cached archive for {addon}");
        Ok(())
    }

    /// Number of entries currently held in memory
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;
    use tokio_test::assert_ok;

    const URL: &str = "https://mediafilez.forgecdn.net/files/4485/146/dbm-10.0.35.zip";
    const FILE: &str = "dbm-10.0.35.zip";

    async fn cache_with_blob(dir: &Path) -> (VersionCache, PathBuf) {
        let cache = VersionCache::new(dir.join("cache"));
        let source = dir.join(FILE);
        fs::write(&source, b"zip bytes").await.unwrap();
        (cache, source)
    }

    #[tokio::test]
    async fn test_record_then_exists_is_true() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;

        assert!(!cache.exists("dbm", URL, FILE).await);
        assert_ok!(cache.record("dbm", URL, FILE, &source).await);
        assert!(cache.exists("dbm", URL, FILE).await);

        // Recording identical values again is a no-op
        assert_ok!(cache.record("dbm", URL, FILE, &source).await);
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_exists_requires_exact_triple() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();

        assert!(!cache.exists("details", URL, FILE).await);
        assert!(!cache.exists("dbm", "https://mediafilez.forgecdn.net/files/9/9/x.zip", FILE).await);
        assert!(!cache.exists("dbm", URL, "dbm-11.0.0.zip").await);
    }

    #[tokio::test]
    async fn test_exists_false_after_out_of_band_blob_deletion() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();

        let blob = dir.path().join("cache").join(files::CACHE_BLOB_DIR).join(FILE);
        fs::remove_file(&blob).await.unwrap();

        assert!(!cache.exists("dbm", URL, FILE).await);
    }

    #[tokio::test]
    async fn test_record_replaces_previous_version_and_blob() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();

        let new_url = "https://mediafilez.forgecdn.net/files/5000/1/dbm-11.0.0.zip";
        let new_file = "dbm-11.0.0.zip";
        cache.record("dbm", new_url, new_file, &source).await.unwrap();

        assert!(cache.exists("dbm", new_url, new_file).await);
        assert!(!cache.exists("dbm", URL, FILE).await);
        assert_eq!(cache.entry_count().await, 1);

        // The superseded blob is gone from the blob store
        let old_blob = dir.path().join("cache").join(files::CACHE_BLOB_DIR).join(FILE);
        assert!(!old_blob.exists());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();
        cache
            .record(
                "details",
                "https://mediafilez.forgecdn.net/files/1/2/details-1.zip",
                "details-1.zip",
                &source,
            )
            .await
            .unwrap();
        cache.save().await.unwrap();

        let reloaded = VersionCache::new(dir.path().join("cache"));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.entry_count().await, 2);
        assert!(reloaded.exists("dbm", URL, FILE).await);
        assert!(
            reloaded
                .exists(
                    "details",
                    "https://mediafilez.forgecdn.net/files/1/2/details-1.zip",
                    "details-1.zip"
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_load_without_index_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let cache = VersionCache::new(dir.path().join("cache"));
        assert_ok!(cache.load().await);
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_load_fails_on_missing_blob() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();
        cache.save().await.unwrap();

        let blob = dir.path().join("cache").join(files::CACHE_BLOB_DIR).join(FILE);
        fs::remove_file(&blob).await.unwrap();

        let reloaded = VersionCache::new(dir.path().join("cache"));
        let result = reloaded.load().await;
        assert!(matches!(result, Err(CacheError::MissingBlob { .. })));
    }

    #[tokio::test]
    async fn test_load_fails_on_duplicate_addon() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let blob_dir = root.join(files::CACHE_BLOB_DIR);
        fs::create_dir_all(&blob_dir).await.unwrap();
        fs::write(blob_dir.join(FILE), b"zip bytes").await.unwrap();

        let entry = serde_json::json!({
            "addon": "dbm",
            "source_url": URL,
            "archive_file": FILE,
            "changed_at": "2026-01-01T00:00:00Z",
        });
        let index = serde_json::json!({ "entries": [entry.clone(), entry] });
        fs::write(
            root.join(files::CACHE_INDEX_FILE),
            serde_json::to_vec_pretty(&index).unwrap(),
        )
        .await
        .unwrap();

        let cache = VersionCache::new(&root);
        let result = cache.load().await;
        assert!(matches!(result, Err(CacheError::DuplicateEntry { .. })));
    }

    #[tokio::test]
    async fn test_load_fails_on_unparsable_index() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(&root).await.unwrap();
        fs::write(root.join(files::CACHE_INDEX_FILE), b"<smartupdate/>")
            .await
            .unwrap();

        let cache = VersionCache::new(&root);
        let result = cache.load().await;
        assert!(matches!(result, Err(CacheError::IndexCorrupted { .. })));
    }

    #[tokio::test]
    async fn test_reuse_copies_blob() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache.record("dbm", URL, FILE, &source).await.unwrap();

        let dest = dir.path().join("scratch").join(FILE);
        cache.reuse("dbm", &dest).await.unwrap();
        assert_eq!(fs::read(&dest).await.unwrap(), b"zip bytes");
    }

    #[tokio::test]
    async fn test_reuse_without_entry_fails() {
        let dir = tempdir().unwrap();
        let cache = VersionCache::new(dir.path().join("cache"));

        let result = cache.reuse("dbm", &dir.path().join(FILE)).await;
        assert!(matches!(result, Err(CacheError::EntryNotFound { .. })));
    }

    #[tokio::test]
    async fn test_index_is_sorted_by_addon() {
        let dir = tempdir().unwrap();
        let (cache, source) = cache_with_blob(dir.path()).await;
        cache
            .record("zygor", "https://mediafilez.forgecdn.net/files/1/1/z.zip", "z.zip", &source)
            .await
            .unwrap();
        cache
            .record("atlas", "https://mediafilez.forgecdn.net/files/1/2/a.zip", "a.zip", &source)
            .await
            .unwrap();
        cache.save().await.unwrap();

        let raw = fs::read_to_string(
            dir.path().join("cache").join(files::CACHE_INDEX_FILE),
        )
        .await
        .unwrap();
        let atlas_pos = raw.find("atlas").unwrap();
        let zygor_pos = raw.find("zygor").unwrap();
        assert!(atlas_pos < zygor_pos);
    }
}
