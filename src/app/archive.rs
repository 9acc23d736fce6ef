//! Addon archive validation and extraction
//!
//! Zip handling is synchronous in the `zip` crate, so both operations run
//! on the blocking thread pool. Validation is a pre-flight integrity gate:
//! it answers yes/no and never errors, while extraction reports real
//! failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::errors::ArchiveResult;

/// Check that an archive is structurally sound and non-empty.
///
/// Forces a full directory-entry read; any structural problem (unreadable
/// file, broken central directory, empty archive) yields `false` rather
/// than an error.
pub async fn validate(archive_path: &Path) -> bool {
    let path = archive_path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(_) => return false,
        };
        let mut archive = match ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(_) => return false,
        };
        if archive.len() == 0 {
            return false;
        }
        for index in 0..archive.len() {
            if archive.by_index(index).is_err() {
                return false;
            }
        }
        true
    })
    .await
    .unwrap_or(false)
}

/// Extract all entries of an archive into `destination`, overwriting
/// existing files.
///
/// # Errors
///
/// Returns `ArchiveError` if the archive cannot be opened or any entry
/// fails to extract.
pub async fn extract(archive_path: &Path, destination: &Path) -> ArchiveResult<()> {
    let path = archive_path.to_path_buf();
    let dest = destination.to_path_buf();

    tokio::task::spawn_blocking(move || extract_sync(&path, &dest)).await?
}

fn extract_sync(archive_path: &Path, destination: &Path) -> ArchiveResult<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        // Entries with traversal shenanigans in their names are skipped
        let relative: PathBuf = match entry.enclosed_name() {
            Some(name) => name,
            None => continue,
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}
