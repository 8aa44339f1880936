//! The `list` command: print the device registry.

use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Arguments for `blobup list`.
#[derive(Args)]
pub struct ListCommand {}

impl ListCommand {
    /// Print the configured devices.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors.
    pub fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config = Config::load_with_optional(config_path)?;

        println!("{}", "Configured devices".bold());
        for device in &config.devices {
            println!(
                "  {} {} ({} extraction, {} fingerprint)",
                format!("{}:", device.codename).cyan(),
                device.channel,
                device.extraction,
                device.fingerprint_source,
            );
        }
        Ok(())
    }
}
