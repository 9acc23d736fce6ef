//! Command-line argument parsing for curse_fetcher
//!
//! This module defines the CLI structure using clap derive macros:
//! updating the configured addons, checking and applying self-updates,
//! and managing the configuration file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// curse_fetcher - keep World of Warcraft addons up to date
#[derive(Parser, Debug)]
#[command(
    name = "curse_fetcher",
    version,
    about = "Keep World of Warcraft addons in sync with CurseForge",
    long_about = "Downloads the latest version of every configured addon concurrently, \
skipping addons whose exact version is already held in the local version cache, \
and keeps the application binary itself up to date."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress the progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Update all configured addons
    Update(UpdateArgs),

    /// Check whether a newer application release is available
    CheckUpdate,

    /// Download and apply the latest application release
    SelfUpdate(SelfUpdateArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the update command
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Number of concurrently processed addons (overrides configuration)
    #[arg(short = 'j', long)]
    pub concurrent: Option<usize>,
}

/// Arguments for the self-update command
#[derive(Args, Debug, Clone)]
pub struct SelfUpdateArgs {
    /// Seconds to wait before the relaunched process starts (max 10)
    #[arg(long, default_value = "2")]
    pub restart_delay: u32,

    /// Apply the update without relaunching afterwards
    #[arg(long)]
    pub no_restart: bool,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented starter configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the active configuration file
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective log level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.global.very_verbose {
            "debug"
        } else if self.global.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_command_parsing() {
        let cli = Cli::try_parse_from(["curse_fetcher", "update", "-j", "8"]).unwrap();
        match cli.command {
            Commands::Update(args) => assert_eq!(args.concurrent, Some(8)),
            other => panic!("Expected update command, got {other:?}"),
        }
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = Cli::try_parse_from(["curse_fetcher", "-v", "update"]).unwrap();
        assert_eq!(cli.log_level(), "info");

        let cli = Cli::try_parse_from(["curse_fetcher", "--very-verbose", "update"]).unwrap();
        assert_eq!(cli.log_level(), "debug");

        let cli = Cli::try_parse_from(["curse_fetcher", "update"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_self_update_defaults() {
        let cli = Cli::try_parse_from(["curse_fetcher", "self-update"]).unwrap();
        match cli.command {
            Commands::SelfUpdate(args) => {
                assert_eq!(args.restart_delay, 2);
                assert!(!args.no_restart);
            }
            other => panic!("Expected self-update command, got {other:?}"),
        }
    }
}
