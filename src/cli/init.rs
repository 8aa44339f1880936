//! The `init` command: write a template configuration file.

use crate::config::Config;
use crate::core::BlobupError;
use crate::utils::fs::atomic_write;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for `blobup init`.
#[derive(Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    force: bool,
}

impl InitCommand {
    /// Write the template configuration.
    ///
    /// # Errors
    ///
    /// Fails when a configuration already exists (without `--force`) or the
    /// file cannot be written.
    pub fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let path = match config_path {
            Some(p) => p,
            None => Config::default_path()?,
        };

        if path.exists() && !self.force {
            return Err(BlobupError::ConfigError {
                message: format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ),
            }
            .into());
        }

        atomic_write(&path, Config::template())?;
        println!("Created {}", path.display());
        println!("Edit the device registry and review settings before running 'blobup update'.");
        Ok(())
    }
}
