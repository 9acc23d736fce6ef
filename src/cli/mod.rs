//! Command-line interface
//!
//! Argument parsing, command handlers and terminal progress rendering.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands};
pub use commands::{
    handle_check_update, handle_config, handle_self_update, handle_update, startup_cleanup,
};
