//! Detached application relaunch
//!
//! Replacing a running executable only takes effect on the next start, so
//! the restart is delegated to a short-lived helper process that waits and
//! then launches the installed binary, fully decoupled from the current
//! process. The indirection is platform-specific and isolated here.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::constants::github;
use crate::errors::UpdateResult;

/// Spawn a detached process that relaunches `executable` after
/// `delay_secs` seconds (capped at 10). The current process is free to
/// exit immediately afterwards.
pub fn spawn_detached_relaunch(executable: &Path, delay_secs: u32) -> UpdateResult<()> {
    let delay = capped_delay(delay_secs);

    #[cfg(unix)]
    {
        // "$0" keeps the executable path intact regardless of spaces
        Command::new("sh")
            .arg("-c")
            .arg(format!("sleep {delay}; exec \"$0\""))
            .arg(executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
    }

    #[cfg(windows)]
    {
        // "start" with an empty title decouples the relaunched process
        // from the cmd.exe helper; ping serves as the delay.
        Command::new("cmd")
            .arg("/C")
            .arg(format!(
                "ping 127.0.0.1 -n {} > nul & start \"\" \"{}\"",
                delay + 1,
                executable.display()
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
    }

    tracing::info!("Scheduled relaunch of {} in {delay}s", executable.display());
    Ok(())
}

fn capped_delay(delay_secs: u32) -> u32 {
    delay_secs.min(github::MAX_RESTART_DELAY_SECS)
}
