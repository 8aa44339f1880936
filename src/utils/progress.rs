//! Download progress reporting.
//!
//! Thin wrapper over `indicatif` so the archive fetcher does not care whether
//! a bar is actually drawn. Bars are suppressed when stderr is not a
//! terminal, when `BLOBUP_NO_PROGRESS` is set, or after the CLI disables
//! them for `--quiet` runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

static PROGRESS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable progress bars for the rest of the process.
pub fn disable_progress() {
    PROGRESS_DISABLED.store(true, Ordering::Relaxed);
}

/// Whether progress bars should be drawn at all.
#[must_use]
pub fn progress_enabled() -> bool {
    use std::io::IsTerminal;
    !PROGRESS_DISABLED.load(Ordering::Relaxed)
        && std::env::var_os("BLOBUP_NO_PROGRESS").is_none()
        && std::io::stderr().is_terminal()
}

/// Create a byte-progress bar for a download of known or unknown length.
///
/// With a known length the bar shows bytes and ETA; without one it degrades
/// to a spinner with a byte counter. Returns a hidden bar when progress
/// output is disabled.
#[must_use]
pub fn download_bar(total_bytes: Option<u64>, message: String) -> ProgressBar {
    if !progress_enabled() {
        return ProgressBar::hidden();
    }

    let bar = match total_bytes {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg}\n{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    bar.set_message(message);
    bar
}
