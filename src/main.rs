//! blobup CLI entry point.
//!
//! Parses the command line, runs the selected command, and renders any error
//! through the user-friendly error display before exiting non-zero.

use anyhow::Result;
use blobup::cli::Cli;
use blobup::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
