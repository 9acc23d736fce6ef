//! Concurrent batch coordination over all configured addons
//!
//! The coordinator resolves every addon page URL to a direct download URL,
//! loads the version cache, fans out one pipeline per addon (bounded by a
//! semaphore) and folds the per-addon progress events into one aggregate
//! 0-100 signal. The cache is persisted only when every pipeline succeeded;
//! a failed or canceled batch leaves the pre-batch cache state untouched.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::cache::VersionCache;
use crate::app::curse;
use crate::app::pipeline;
use crate::app::progress::{AddonProgress, AddonState};
use crate::app::resolver::ResolveDownloadUrls;
use crate::constants::pipelines;
use crate::errors::{AppError, CurseError, Result};

/// Resolved addon work item: slug plus direct download URL. Derived per
/// batch, never persisted.
#[derive(Debug, Clone)]
pub struct AddonSource {
    pub slug: String,
    pub download_url: String,
}

/// Process every configured addon concurrently.
///
/// Returns the number of addons that actually performed a network
/// transfer (cache reuses do not count).
///
/// # Arguments
///
/// * `addon_page_urls` - Ordered, deduplicated addon page URLs
/// * `download_dir` - Shared scratch directory for downloaded archives
/// * `extract_dir` - Target directory addons are extracted into
/// * `concurrent_limit` - Upper bound on concurrently running pipelines
/// * `percent` - Optional sink for the aggregate 0-100 progress value
///
/// # Errors
///
/// Any pipeline failure fails the whole batch; there is no partial
/// success value and no rollback of already-extracted addons. Cancellation
/// propagates as [`AppError::Canceled`].
#[allow(clippy::too_many_arguments)]
pub async fn process_all<R: ResolveDownloadUrls>(
    client: &Client,
    cache: Arc<VersionCache>,
    resolver: &R,
    addon_page_urls: &[String],
    download_dir: &Path,
    extract_dir: &Path,
    concurrent_limit: usize,
    percent: Option<mpsc::Sender<u8>>,
    cancel: &CancellationToken,
) -> Result<u32> {
    let mut slugs = Vec::with_capacity(addon_page_urls.len());
    for url in addon_page_urls {
        let slug = curse::addon_slug_from_page_url(url);
        if slug.is_empty() {
            return Err(CurseError::InvalidPageUrl { url: url.clone() }.into());
        }
        slugs.push(slug);
    }

    if slugs.is_empty() {
        return Ok(0);
    }

    if cancel.is_cancelled() {
        return Err(AppError::Canceled);
    }

    // One batched resolution round for all addons
    let resolved = resolver.resolve(&slugs).await?;
    let mut sources = Vec::with_capacity(slugs.len());
    for slug in &slugs {
        // resolve() promises an entry per requested slug; hold it to that
        let download_url = match resolved.get(slug) {
            Some(url) => url.clone(),
            None => {
                return Err(crate::errors::ResolveError::Unresolved {
                    addon: slug.clone(),
                }
                .into());
            }
        };
        sources.push(AddonSource {
            slug: slug.clone(),
            download_url,
        });
    }

    cache.load().await?;
    info!(
        "Processing {} addons ({} cached versions known)",
        slugs.len(),
        cache.entry_count().await
    );

    let (event_tx, event_rx) = mpsc::channel(pipelines::PROGRESS_CHANNEL_CAPACITY);
    let aggregator = spawn_aggregator(slugs.clone(), event_rx, percent);

    let semaphore = Arc::new(Semaphore::new(concurrent_limit.max(1)));
    let mut tasks = JoinSet::new();

    for source in sources {
        let AddonSource { slug, download_url: url } = source;
        let client = client.clone();
        let cache = Arc::clone(&cache);
        let semaphore = Arc::clone(&semaphore);
        let events = event_tx.clone();
        let cancel = cancel.clone();
        let download_dir = download_dir.to_path_buf();
        let extract_dir = extract_dir.to_path_buf();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(AppError::Canceled),
            };
            pipeline::process_addon(
                &client,
                &cache,
                &slug,
                &url,
                &download_dir,
                &extract_dir,
                &events,
                &cancel,
            )
            .await
        });
    }
    drop(event_tx);

    // Wait for every pipeline; remember the first real failure and
    // whether anyone observed cancellation.
    let mut first_failure: Option<AppError> = None;
    let mut canceled = false;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_cancellation() => canceled = true,
            Ok(Err(err)) => {
                warn!("Addon pipeline failed ({}): {err}", err.category());
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
            Err(join_err) => {
                if first_failure.is_none() {
                    first_failure =
                        Some(AppError::generic(format!("addon pipeline task failed: {join_err}")));
                }
            }
        }
    }

    let updated = aggregator
        .await
        .map_err(|e| AppError::generic(format!("progress aggregator failed: {e}")))?;

    if let Some(err) = first_failure {
        return Err(err);
    }
    if canceled {
        return Err(AppError::Canceled);
    }

    // Sole writer: the cache hits disk exactly once, after a fully
    // successful batch.
    cache.save().await?;
    info!("Batch finished, {updated} addons required a transfer");

    Ok(updated)
}

/// Fold addon progress events into per-addon scores and the aggregate
/// percent signal. Returns the count of addons that took the download
/// branch.
///
/// Each addon contributes 0-200 raw points: 0-100 for the transfer or
/// reuse phase, plus 100 once its extract completes. The emitted aggregate
/// never decreases, no matter how events from different addons interleave.
fn spawn_aggregator(
    slugs: Vec<String>,
    mut events: mpsc::Receiver<AddonProgress>,
    percent: Option<mpsc::Sender<u8>>,
) -> JoinHandle<u32> {
    tokio::spawn(async move {
        let mut scores: HashMap<String, u16> = slugs.into_iter().map(|slug| (slug, 0)).collect();
        let mut updated: u32 = 0;
        let mut last_percent: u8 = 0;

        while let Some(event) = events.recv().await {
            let Some(score) = scores.get_mut(&event.addon) else {
                continue;
            };
            match event.state {
                AddonState::Downloading => {
                    *score = (*score).max(u16::from(event.percent.min(100)));
                }
                AddonState::NoTransferNeeded | AddonState::ReusedFromCache => {
                    *score = (*score).max(100);
                }
                AddonState::DownloadComplete => {
                    *score = (*score).max(100);
                    updated += 1;
                }
                AddonState::ExtractComplete => {
                    *score = 200;
                }
            }

            let total = total_percent(&scores);
            if total > last_percent {
                last_percent = total;
                if let Some(sink) = &percent {
                    let _ = sink.send(total).await;
                }
            }
        }

        updated
    })
}

/// Aggregate percentage over all addon scores, rounded and clamped to
/// [0, 100]. Zero addons yields 0 rather than a division failure.
fn total_percent(scores: &HashMap<String, u16>) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let sum: u64 = scores.values().map(|score| u64::from(*score)).sum();
    let full = scores.len() as u64 * 200;
    let exact = sum as f64 / full as f64 * 100.0;
    if !exact.is_finite() {
        return 0;
    }
    (exact.round() as u64).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use crate::app::archive::tests::write_zip;
    use crate::app::client::ClientConfig;
    use crate::errors::{ResolveError, ResolveResult};

    /// Resolver backed by a fixed slug -> URL map
    struct StubResolver {
        urls: HashMap<String, String>,
    }

    impl StubResolver {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                urls: pairs
                    .iter()
                    .map(|(slug, url)| (slug.to_string(), url.to_string()))
                    .collect(),
            }
        }
    }

    impl ResolveDownloadUrls for StubResolver {
        async fn resolve(&self, slugs: &[String]) -> ResolveResult<HashMap<String, String>> {
            let mut resolved = HashMap::new();
            for slug in slugs {
                let url = self.urls.get(slug).ok_or_else(|| ResolveError::Unresolved {
                    addon: slug.clone(),
                })?;
                resolved.insert(slug.clone(), url.clone());
            }
            Ok(resolved)
        }
    }

    fn test_client() -> Client {
        ClientConfig::default().build_http_client().unwrap()
    }

    fn page_url(slug: &str) -> String {
        format!("https://www.curseforge.com/wow/addons/{slug}")
    }

    fn download_url(file: &str) -> String {
        format!("https://mediafilez.forgecdn.net/files/1/2/{file}")
    }

    fn spawn_percent_collector() -> (mpsc::Sender<u8>, JoinHandle<Vec<u8>>) {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(value) = rx.recv().await {
                seen.push(value);
            }
            seen
        });
        (tx, handle)
    }

    #[tokio::test]
    async fn test_empty_batch_yields_zero() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(VersionCache::new(dir.path().join("cache")));
        let resolver = StubResolver::new(&[]);
        let cancel = CancellationToken::new();

        let updated = process_all(
            &test_client(),
            cache,
            &resolver,
            &[],
            dir.path(),
            dir.path(),
            4,
            None,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_invalid_page_url_is_validation_error() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(VersionCache::new(dir.path().join("cache")));
        let resolver = StubResolver::new(&[]);
        let cancel = CancellationToken::new();

        let result = process_all(
            &test_client(),
            cache,
            &resolver,
            &["https://example.com/not-an-addon".to_string()],
            dir.path(),
            dir.path(),
            4,
            None,
            &cancel,
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Curse(CurseError::InvalidPageUrl { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unresolved_slug_fails_batch() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(VersionCache::new(dir.path().join("cache")));
        let resolver = StubResolver::new(&[]);
        let cancel = CancellationToken::new();

        let result = process_all(
            &test_client(),
            cache,
            &resolver,
            &[page_url("deadly-boss-mods")],
            dir.path(),
            dir.path(),
            4,
            None,
            &cancel,
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Resolve(ResolveError::Unresolved { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cached_batch_reuses_everything() {
        let dir = tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        let download_dir = dir.path().join("download");
        let extract_dir = dir.path().join("addons");

        // Both addons already cached on disk with valid archive blobs
        let seeding = VersionCache::new(&cache_root);
        for (slug, file, entry_name) in [
            ("deadly-boss-mods", "dbm-10.zip", "DBM-Core/DBM-Core.toc"),
            ("details", "details-5.zip", "Details/Details.toc"),
        ] {
            let seed = dir.path().join(file);
            write_zip(&seed, &[(entry_name, b"## Interface: 100000")]);
            seeding
                .record(slug, &download_url(file), file, &seed)
                .await
                .unwrap();
        }
        seeding.save().await.unwrap();

        let resolver = StubResolver::new(&[
            ("deadly-boss-mods", &download_url("dbm-10.zip")),
            ("details", &download_url("details-5.zip")),
        ]);
        let (percent_tx, percent_handle) = spawn_percent_collector();
        let cancel = CancellationToken::new();

        let updated = process_all(
            &test_client(),
            Arc::new(VersionCache::new(&cache_root)),
            &resolver,
            &[page_url("deadly-boss-mods"), page_url("details")],
            &download_dir,
            &extract_dir,
            4,
            Some(percent_tx),
            &cancel,
        )
        .await
        .unwrap();

        // Nothing needed a transfer, but everything got extracted
        assert_eq!(updated, 0);
        assert!(extract_dir.join("DBM-Core/DBM-Core.toc").exists());
        assert!(extract_dir.join("Details/Details.toc").exists());

        let percents = percent_handle.await.unwrap();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_pipeline_failure_fails_whole_batch() {
        let dir = tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        let extract_dir = dir.path().join("addons");

        // One sound archive blob, one garbage blob that will fail extraction
        let seeding = VersionCache::new(&cache_root);
        let good = dir.path().join("dbm-10.zip");
        write_zip(&good, &[("DBM-Core/DBM-Core.toc", b"## Title: DBM")]);
        seeding
            .record("deadly-boss-mods", &download_url("dbm-10.zip"), "dbm-10.zip", &good)
            .await
            .unwrap();
        let broken = dir.path().join("details-5.zip");
        std::fs::write(&broken, b"not a zip archive").unwrap();
        seeding
            .record("details", &download_url("details-5.zip"), "details-5.zip", &broken)
            .await
            .unwrap();
        seeding.save().await.unwrap();

        let resolver = StubResolver::new(&[
            ("deadly-boss-mods", &download_url("dbm-10.zip")),
            ("details", &download_url("details-5.zip")),
        ]);
        let cancel = CancellationToken::new();

        let result = process_all(
            &test_client(),
            Arc::new(VersionCache::new(&cache_root)),
            &resolver,
            &[page_url("deadly-boss-mods"), page_url("details")],
            &dir.path().join("download"),
            &extract_dir,
            4,
            None,
            &cancel,
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_cancellation());
        // Already-extracted addons stay on disk, there is no rollback
        assert!(extract_dir.join("DBM-Core/DBM-Core.toc").exists());
    }

    #[tokio::test]
    async fn test_canceled_batch_skips_cache_save() {
        let dir = tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        let resolver =
            StubResolver::new(&[("deadly-boss-mods", &download_url("dbm-10.zip"))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = process_all(
            &test_client(),
            Arc::new(VersionCache::new(&cache_root)),
            &resolver,
            &[page_url("deadly-boss-mods")],
            dir.path(),
            dir.path(),
            4,
            None,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(AppError::Canceled)));
        // No save on cancellation: the index file was never written
        assert!(!cache_root.join(crate::constants::files::CACHE_INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_aggregator_counts_only_download_transitions() {
        // Scenario: a and b reuse their cached versions, c downloads
        let slugs: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let (event_tx, event_rx) = mpsc::channel(64);
        let (percent_tx, percent_handle) = spawn_percent_collector();
        let aggregator = spawn_aggregator(slugs, event_rx, Some(percent_tx));

        for slug in ["a", "b"] {
            event_tx
                .send(AddonProgress::new(AddonState::NoTransferNeeded, slug, 100))
                .await
                .unwrap();
            event_tx
                .send(AddonProgress::new(AddonState::ReusedFromCache, slug, 100))
                .await
                .unwrap();
            event_tx
                .send(AddonProgress::new(AddonState::ExtractComplete, slug, 100))
                .await
                .unwrap();
        }
        for percent in [25, 50, 100] {
            event_tx
                .send(AddonProgress::new(AddonState::Downloading, "c", percent))
                .await
                .unwrap();
        }
        event_tx
            .send(AddonProgress::new(AddonState::DownloadComplete, "c", 100))
            .await
            .unwrap();
        event_tx
            .send(AddonProgress::new(AddonState::ExtractComplete, "c", 100))
            .await
            .unwrap();
        drop(event_tx);

        let updated = aggregator.await.unwrap();
        assert_eq!(updated, 1);

        let percents = percent_handle.await.unwrap();
        assert!(percents.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_aggregator_counts_every_download() {
        // Scenario: empty cache, all three addons download
        let slugs: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let (event_tx, event_rx) = mpsc::channel(64);
        let aggregator = spawn_aggregator(slugs, event_rx, None);

        for slug in ["a", "b", "c"] {
            event_tx
                .send(AddonProgress::new(AddonState::Downloading, slug, 50))
                .await
                .unwrap();
            event_tx
                .send(AddonProgress::new(AddonState::DownloadComplete, slug, 100))
                .await
                .unwrap();
            event_tx
                .send(AddonProgress::new(AddonState::ExtractComplete, slug, 100))
                .await
                .unwrap();
        }
        drop(event_tx);

        assert_eq!(aggregator.await.unwrap(), 3);
    }

    #[test]
    fn test_total_percent_bounds() {
        let empty: HashMap<String, u16> = HashMap::new();
        assert_eq!(total_percent(&empty), 0);

        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 0);
        scores.insert("b".to_string(), 0);
        assert_eq!(total_percent(&scores), 0);

        scores.insert("a".to_string(), 200);
        scores.insert("b".to_string(), 200);
        assert_eq!(total_percent(&scores), 100);

        scores.insert("b".to_string(), 100);
        assert_eq!(total_percent(&scores), 75);
    }
}
