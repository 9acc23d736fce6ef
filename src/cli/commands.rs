//! Command handlers wiring the core modules to the CLI
//!
//! Each handler loads what it needs, builds the shared HTTP client and
//! drives one of the two subsystems: the concurrent addon batch or the
//! self-update state machine. Ctrl+C is wired to the cancellation token
//! that threads through every pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{
    batch, BuildInfoProbe, ClientConfig, ScraperApiClient, UpdateManager, VersionCache,
};
use crate::cli::args::{ConfigAction, ConfigArgs, GlobalArgs, SelfUpdateArgs, UpdateArgs};
use crate::cli::progress::spawn_progress_bar;
use crate::config::AppConfig;
use crate::constants::pipelines;
use crate::errors::{AppError, Result};

/// Update all configured addons
pub async fn handle_update(args: UpdateArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global).await?;
    let client = ClientConfig::default().build_http_client()?;
    let cache = Arc::new(VersionCache::new(cache_root()?));
    let resolver = ScraperApiClient::new(
        client.clone(),
        config.options.scraper_base_url.clone(),
        config.options.scraper_token.clone(),
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    // Scratch directory for downloaded archives, removed on drop
    let temp_base = config.temp_dir();
    tokio::fs::create_dir_all(&temp_base).await?;
    let download_dir = tempfile::Builder::new()
        .prefix("curse-fetcher-")
        .tempdir_in(&temp_base)?;

    let concurrent = args.concurrent.unwrap_or(config.options.concurrent_limit);

    let (percent, bar) = if global.quiet {
        (None, None)
    } else {
        let (percent_tx, percent_rx) = mpsc::channel(pipelines::PROGRESS_CHANNEL_CAPACITY);
        (Some(percent_tx), Some(spawn_progress_bar(percent_rx)))
    };

    let outcome = batch::process_all(
        &client,
        Arc::clone(&cache),
        &resolver,
        &config.addons,
        download_dir.path(),
        &config.target_dir,
        concurrent,
        percent,
        &cancel,
    )
    .await;

    if let Some(bar_task) = bar {
        let _ = bar_task.await;
    }

    match outcome {
        Ok(updated) => {
            println!(
                "Finished: {updated} of {} addon(s) required a download",
                config.addons.len()
            );

            if config.options.auto_update {
                notify_on_available_update().await;
            }
            Ok(())
        }
        Err(err) if err.is_cancellation() => {
            println!("Canceled.");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Check the release feed and report whether a newer binary exists
pub async fn handle_check_update(_global: &GlobalArgs) -> Result<()> {
    let manager = update_manager()?;
    let update = manager.check_for_update().await?;

    println!("Installed version: {}", update.installed_version);
    println!("Available version: {}", update.available_version);
    if update.update_available {
        println!("Run 'curse_fetcher self-update' to install the new version.");
    } else {
        println!("Already up to date.");
    }
    Ok(())
}

/// Download, apply and (optionally) restart into the latest release
pub async fn handle_self_update(args: SelfUpdateArgs, _global: &GlobalArgs) -> Result<()> {
    let manager = update_manager()?;
    let update = manager.check_for_update().await?;

    if !update.update_available {
        println!("Already up to date ({}).", update.installed_version);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    println!(
        "Updating {} -> {} ...",
        update.installed_version, update.available_version
    );
    manager.download_update(&update, &cancel).await?;
    manager.apply_update().await?;
    println!("Update applied.");

    if args.no_restart {
        println!("Restart the application to run the new version.");
    } else {
        manager.restart_application(args.restart_delay)?;
        println!("Restarting in {} second(s).", args.restart_delay.min(10));
    }
    Ok(())
}

/// Manage the configuration file
pub async fn handle_config(args: ConfigArgs, global: &GlobalArgs) -> Result<()> {
    let path = config_path(global)?;

    match args.action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(AppError::generic(format!(
                    "configuration already exists at {} (use --force to overwrite)",
                    path.display()
                )));
            }
            AppConfig::write_default(&path).await?;
            println!("Wrote starter configuration to {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|_| {
                AppError::generic(format!("no configuration file at {}", path.display()))
            })?;
            print!("{raw}");
            Ok(())
        }
    }
}

/// Remove the `.bak` a previous self-update left next to the executable.
/// Runs at every startup; failures are only logged.
pub async fn startup_cleanup() {
    let manager = match update_manager() {
        Ok(manager) => manager,
        Err(err) => {
            warn!("Skipping startup cleanup: {err}");
            return;
        }
    };
    if let Err(err) = manager.remove_stale_backup().await {
        warn!("Could not remove stale backup: {err}");
    }
}

/// Tell the user about a newer release after an addon run; failures of
/// this courtesy check are only logged.
async fn notify_on_available_update() {
    let manager = match update_manager() {
        Ok(manager) => manager,
        Err(err) => {
            warn!("Update check skipped: {err}");
            return;
        }
    };
    match manager.check_for_update().await {
        Ok(update) if update.update_available => {
            println!(
                "Application version {} is available; run 'curse_fetcher self-update'.",
                update.available_version
            );
        }
        Ok(_) => {}
        Err(err) => warn!("Update check failed: {err}"),
    }
}

fn config_path(global: &GlobalArgs) -> Result<PathBuf> {
    global
        .config
        .clone()
        .or_else(AppConfig::default_path)
        .ok_or_else(|| AppError::generic("could not determine the configuration path"))
}

async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let path = config_path(global)?;
    info!("Loading configuration from {}", path.display());
    Ok(AppConfig::load(&path).await?)
}

fn cache_root() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("curse-fetcher").join("cache"))
        .ok_or_else(|| AppError::generic("could not determine the cache directory"))
}

fn update_manager() -> Result<UpdateManager<BuildInfoProbe>> {
    let client = ClientConfig::default().build_http_client()?;
    let executable = std::env::current_exe()?;
    let staging = std::env::temp_dir().join("curse-fetcher").join("self-update");
    Ok(UpdateManager::new(client, BuildInfoProbe, executable, staging))
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, canceling");
            cancel.cancel();
        }
    });
}
