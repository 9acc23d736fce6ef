//! Terminal progress rendering
//!
//! One indicatif bar driven by the batch coordinator's aggregate percent
//! channel. The bar task ends when the channel closes at batch completion.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawn a task that renders aggregate percent values as a progress bar
pub fn spawn_progress_bar(mut percent_rx: mpsc::Receiver<u8>) -> JoinHandle<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}%")
            .expect("progress template is valid")
            .progress_chars("##-"),
    );

    tokio::spawn(async move {
        while let Some(percent) = percent_rx.recv().await {
            bar.set_position(u64::from(percent));
        }
        bar.finish_and_clear();
    })
}
