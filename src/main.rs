//! curse_fetcher CLI application
//!
//! Command-line interface for keeping World of Warcraft addons in sync
//! with CurseForge. Features concurrent downloads, a persisted version
//! cache and application self-update.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use curse_fetcher::cli::{
    handle_check_update, handle_config, handle_self_update, handle_update, startup_cleanup, Cli,
    Commands,
};
use curse_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(&cli);

    info!("curse_fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    // A previous self-update may have left a .bak next to the executable
    startup_cleanup().await;

    // Execute the appropriate command
    match cli.command {
        Commands::Update(args) => {
            info!("Executing update command");
            handle_update(args, &cli.global).await
        }
        Commands::CheckUpdate => {
            info!("Executing check-update command");
            handle_check_update(&cli.global).await
        }
        Commands::SelfUpdate(args) => {
            info!("Executing self-update command");
            handle_self_update(args, &cli.global).await
        }
        Commands::Config(args) => handle_config(args, &cli.global).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("curse_fetcher={log_level}").parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();
}
