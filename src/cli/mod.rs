//! Command-line interface for blobup.
//!
//! Each subcommand lives in its own module with its own argument structure
//! and execution logic:
//!
//! - `update` - run the full pipeline for all (or the named) devices
//! - `check` - resolve latest versions and report what is out of date
//! - `list` - print the configured device registry
//! - `init` - write a template configuration file
//!
//! Global flags control verbosity (`--verbose`/`--quiet`, mapped onto the
//! tracing env-filter; `RUST_LOG` still wins when set) and the configuration
//! path (`--config`, falling back to `BLOBUP_CONFIG` and the platform config
//! directory).

mod check;
mod init;
mod list;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main CLI structure for blobup.
#[derive(Parser)]
#[command(
    name = "blobup",
    about = "Update Android device trees from upstream vendor firmware releases",
    version,
    author,
    long_about = "blobup checks a vendor firmware feed for the latest release per device, \
                  downloads and extracts the recovery image, patches the device tree's \
                  manifests, commits the result, and pushes it for review."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Update devices: download, extract, patch, commit, and push for review.
    Update(update::UpdateCommand),

    /// Resolve latest firmware versions without downloading or writing.
    Check(check::CheckCommand),

    /// Print the configured device registry.
    List(list::ListCommand),

    /// Write a template configuration file.
    Init(init::InitCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Propagates the subcommand's error for top-level display.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        if self.quiet {
            crate::utils::progress::disable_progress();
        }

        let config_path = self.config.clone();
        match self.command {
            Commands::Update(cmd) => cmd.execute(config_path).await,
            Commands::Check(cmd) => cmd.execute(config_path).await,
            Commands::List(cmd) => cmd.execute(config_path),
            Commands::Init(cmd) => cmd.execute(config_path),
        }
    }

    /// Install the tracing subscriber according to the verbosity flags.
    ///
    /// `RUST_LOG` overrides the flags when set. Repeated initialization (as
    /// happens in tests) is silently ignored.
    fn init_logging(&self) {
        let filter = if std::env::var_os("RUST_LOG").is_some() {
            EnvFilter::from_default_env()
        } else {
            let level = if self.verbose {
                "debug"
            } else if self.quiet {
                "error"
            } else {
                "info"
            };
            EnvFilter::new(level)
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
