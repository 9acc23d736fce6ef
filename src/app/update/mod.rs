//! Application self-update
//!
//! Check, download, apply, restart: the manager walks the release feed,
//! stages the new binary in a scratch directory and swaps it in with a
//! backup/restore discipline. The installed executable is only touched
//! after every precondition, including the version-regression guard, has
//! passed. Every filesystem mutation is followed by a short settling
//! delay; OS write-behind and AV scanners may still hold the file after
//! the syscall returns.

pub mod github;
pub mod restart;

use std::future::Future;
use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::archive;
use crate::app::transfer;
use crate::app::version::AppVersion;
use crate::constants::{files, github as github_consts};
use crate::errors::{Result, UpdateError, UpdateResult};

pub use github::ReleaseInfo;

/// Outcome of one update check; immutable once built
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub installed_version: AppVersion,
    pub available_version: AppVersion,
    pub update_available: bool,
    pub download_url: String,
    pub file_name: String,
}

impl UpdateInfo {
    /// Combine the installed version with a release descriptor
    pub fn new(installed_version: AppVersion, release: ReleaseInfo) -> Self {
        let update_available = release.version > installed_version;
        Self {
            installed_version,
            available_version: release.version,
            update_available,
            download_url: release.download_url,
            file_name: release.file_name,
        }
    }
}

/// Source of version information for the installed and staged executables.
///
/// Injected so the apply path can be exercised without real binaries.
pub trait VersionProbe {
    /// Version of the currently running installation
    fn installed_version(&self) -> UpdateResult<AppVersion>;

    /// Version reported by an executable file on disk
    fn executable_version(&self, path: &Path)
        -> impl Future<Output = UpdateResult<AppVersion>> + Send;
}

/// Default probe: the installed version is compiled in, a staged
/// executable is asked directly via its `--version` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildInfoProbe;

impl VersionProbe for BuildInfoProbe {
    fn installed_version(&self) -> UpdateResult<AppVersion> {
        AppVersion::parse(env!("CARGO_PKG_VERSION")).map_err(|e| UpdateError::VersionProbe {
            reason: e.to_string(),
        })
    }

    async fn executable_version(&self, path: &Path) -> UpdateResult<AppVersion> {
        let output = tokio::process::Command::new(path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| UpdateError::VersionProbe {
                reason: format!("failed to run {}: {e}", path.display()),
            })?;

        if !output.status.success() {
            return Err(UpdateError::VersionProbe {
                reason: format!("{} exited with {}", path.display(), output.status),
            });
        }

        // clap prints "<name> <version>"
        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = stdout
            .split_whitespace()
            .last()
            .ok_or_else(|| UpdateError::VersionProbe {
                reason: format!("{} printed no version", path.display()),
            })?;
        AppVersion::parse(token).map_err(|e| UpdateError::VersionProbe {
            reason: e.to_string(),
        })
    }
}

/// Self-update manager for the application binary
#[derive(Debug)]
pub struct UpdateManager<P: VersionProbe> {
    client: Client,
    probe: P,
    executable_path: PathBuf,
    staging_dir: PathBuf,
    repo_owner: String,
    repo_name: String,
}

impl<P: VersionProbe> UpdateManager<P> {
    /// Create a manager for the executable at `executable_path`, staging
    /// downloads under `staging_dir`
    pub fn new(
        client: Client,
        probe: P,
        executable_path: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            probe,
            executable_path: executable_path.into(),
            staging_dir: staging_dir.into(),
            repo_owner: github_consts::RELEASE_OWNER.to_string(),
            repo_name: github_consts::RELEASE_REPO.to_string(),
        }
    }

    /// Override the release feed repository
    pub fn with_release_repo(mut self, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        self.repo_owner = owner.into();
        self.repo_name = repo.into();
        self
    }

    fn executable_file_name(&self) -> UpdateResult<String> {
        self.executable_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| UpdateError::VersionProbe {
                reason: format!(
                    "executable path has no file name: {}",
                    self.executable_path.display()
                ),
            })
    }

    fn staged_executable_path(&self) -> UpdateResult<PathBuf> {
        Ok(self.staging_dir.join(self.executable_file_name()?))
    }

    fn backup_path(&self) -> PathBuf {
        self.executable_path.with_extension(files::BACKUP_FILE_EXTENSION)
    }

    /// Compare the installed version against the latest published release
    pub async fn check_for_update(&self) -> UpdateResult<UpdateInfo> {
        let installed = self.probe.installed_version()?;
        let release =
            github::latest_release(&self.client, &self.repo_owner, &self.repo_name).await?;

        debug!(
            "Update check: installed {installed}, available {}",
            release.version
        );
        Ok(UpdateInfo::new(installed, release))
    }

    /// Download and stage the release archive.
    ///
    /// Clears the staging directory, downloads the asset, extracts it and
    /// verifies the expected executable file name is present afterwards.
    pub async fn download_update(
        &self,
        info: &UpdateInfo,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if fs::try_exists(&self.staging_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&self.staging_dir).await.map_err(UpdateError::Io)?;
        }
        fs::create_dir_all(&self.staging_dir).await.map_err(UpdateError::Io)?;
        settle().await;

        let archive_path = self.staging_dir.join(&info.file_name);
        transfer::download_file(&self.client, &info.download_url, &archive_path, None, cancel)
            .await?;
        settle().await;

        archive::extract(&archive_path, &self.staging_dir).await?;

        let staged = self.staged_executable_path()?;
        if !fs::try_exists(&staged).await.unwrap_or(false) {
            return Err(UpdateError::MissingExecutable {
                file: self.executable_file_name()?,
            }
            .into());
        }

        info!("Staged update {} in {}", info.available_version, self.staging_dir.display());
        Ok(())
    }

    /// Swap the staged executable into place.
    ///
    /// Refuses to apply when the staged executable reports a version
    /// strictly older than the installed one; a corrupted or incomplete
    /// release feed must never downgrade the installation. The installed
    /// executable is renamed to its `.bak` sibling before the copy, so a
    /// prior version survives until the next startup cleans it up.
    pub async fn apply_update(&self) -> Result<()> {
        let staged = self.staged_executable_path()?;
        if !fs::try_exists(&staged).await.unwrap_or(false) {
            return Err(UpdateError::MissingExecutable {
                file: self.executable_file_name()?,
            }
            .into());
        }

        let staged_version = self.probe.executable_version(&staged).await?;
        let installed_version = self.probe.installed_version()?;
        if staged_version < installed_version {
            return Err(UpdateError::VersionRegression {
                staged: staged_version,
                installed: installed_version,
            }
            .into());
        }

        fs::rename(&self.executable_path, self.backup_path())
            .await
            .map_err(UpdateError::Io)?;
        settle().await;

        fs::copy(&staged, &self.executable_path).await.map_err(UpdateError::Io)?;
        settle().await;

        fs::remove_dir_all(&self.staging_dir).await.map_err(UpdateError::Io)?;
        settle().await;

        info!("Applied update, now at {staged_version}");
        Ok(())
    }

    /// Relaunch the installed executable from a detached helper process
    pub fn restart_application(&self, delay_secs: u32) -> UpdateResult<()> {
        restart::spawn_detached_relaunch(&self.executable_path, delay_secs)
    }

    /// Delete the `.bak` left behind by a previous successful apply
    pub async fn remove_stale_backup(&self) -> UpdateResult<()> {
        let backup = self.backup_path();
        if fs::try_exists(&backup).await.unwrap_or(false) {
            fs::remove_file(&backup).await?;
            settle().await;
            debug!("Removed stale backup {}", backup.display());
        }
        Ok(())
    }
}

async fn settle() {
    tokio::time::sleep(files::SETTLE_DELAY).await;
}
