//! Per-addon update pipeline
//!
//! One pipeline run takes a single addon from "download URL known" to
//! "extracted into the target directory": cache check, fetch or reuse,
//! integrity gate, extract, cache record. Progress leaves the pipeline as
//! typed [`AddonProgress`] events; cancellation is observed between every
//! phase and inside the transfer itself.

use std::path::Path;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::archive;
use crate::app::cache::VersionCache;
use crate::app::curse;
use crate::app::progress::{percent_of, AddonProgress, AddonState};
use crate::app::transfer;
use crate::constants::pipelines;
use crate::errors::{AppError, ArchiveError, CurseError, Result};

/// Run the update pipeline for one addon.
///
/// # Arguments
///
/// * `addon` - Addon slug (cache key and progress label)
/// * `download_url` - Direct CDN download URL for the current version
/// * `download_dir` - Scratch directory the archive lands in
/// * `extract_dir` - Target directory the archive is extracted into
/// * `events` - Sink for [`AddonProgress`] events
/// * `cancel` - Cancellation signal
///
/// # Errors
///
/// Fails on a malformed download URL, any transfer error, a corrupted
/// archive, or extraction failure. Cancellation surfaces as
/// [`AppError::Canceled`], never as an ordinary failure.
pub async fn process_addon(
    client: &Client,
    cache: &VersionCache,
    addon: &str,
    download_url: &str,
    download_dir: &Path,
    extract_dir: &Path,
    events: &mpsc::Sender<AddonProgress>,
    cancel: &CancellationToken,
) -> Result<()> {
    let archive_file = curse::archive_file_from_download_url(download_url);
    if archive_file.is_empty() {
        return Err(CurseError::InvalidDownloadUrl {
            url: download_url.to_string(),
        }
        .into());
    }

    if cancel.is_cancelled() {
        return Err(AppError::Canceled);
    }

    let archive_path = download_dir.join(&archive_file);

    if cache.exists(addon, download_url, &archive_file).await {
        // Exact version already held locally, skip the network entirely
        debug!("Cache hit for {addon}, reusing {archive_file}");
        let _ = events
            .send(AddonProgress::new(AddonState::NoTransferNeeded, addon, 100))
            .await;

        cache.reuse(addon, &archive_path).await?;
        let _ = events
            .send(AddonProgress::new(AddonState::ReusedFromCache, addon, 100))
            .await;

        if cancel.is_cancelled() {
            return Err(AppError::Canceled);
        }
        archive::extract(&archive_path, extract_dir).await?;
        let _ = events
            .send(AddonProgress::new(AddonState::ExtractComplete, addon, 100))
            .await;

        return Ok(());
    }

    // Download branch: stream the archive, forwarding byte progress as
    // percent events under this addon's label.
    info!("Downloading {archive_file} for {addon}");

    let (transfer_tx, mut transfer_rx) =
        mpsc::channel::<crate::app::progress::TransferProgress>(pipelines::TRANSFER_EVENT_CAPACITY);
    let forward_events = events.clone();
    let forward_addon = addon.to_string();
    let forwarder = tokio::spawn(async move {
        while let Some(progress) = transfer_rx.recv().await {
            let percent = percent_of(progress.bytes_received, progress.bytes_total);
            let _ = forward_events
                .send(AddonProgress::new(
                    AddonState::Downloading,
                    &forward_addon,
                    percent,
                ))
                .await;
        }
    });

    transfer::download_file(client, download_url, &archive_path, Some(transfer_tx), cancel)
        .await?;

    // Keep per-addon event order intact: all Downloading events must be
    // delivered before the DownloadComplete transition.
    let _ = forwarder.await;
    let _ = events
        .send(AddonProgress::new(AddonState::DownloadComplete, addon, 100))
        .await;

    if cancel.is_cancelled() {
        return Err(AppError::Canceled);
    }

    finish_download(
        cache,
        addon,
        download_url,
        &archive_file,
        &archive_path,
        extract_dir,
        events,
    )
    .await
}

/// Post-download tail of the pipeline: integrity gate, extract, record.
///
/// The cache record happens only after validation and extraction have
/// both succeeded; a corrupted download must not claim a cache slot, or
/// the next run would wrongly treat the broken version as already applied.
pub(crate) async fn finish_download(
    cache: &VersionCache,
    addon: &str,
    download_url: &str,
    archive_file: &str,
    archive_path: &Path,
    extract_dir: &Path,
    events: &mpsc::Sender<AddonProgress>,
) -> Result<()> {
    if !archive::validate(archive_path).await {
        return Err(ArchiveError::Corrupted {
            path: archive_path.to_path_buf(),
        }
        .into());
    }

    archive::extract(archive_path, extract_dir).await?;
    let _ = events
        .send(AddonProgress::new(AddonState::ExtractComplete, addon, 100))
        .await;

    cache
        .record(addon, download_url, archive_file, archive_path)
        .await?;

    debug!("Pipeline finished for {addon}");
    Ok(())
}
