//! The `check` command: resolve latest versions, report, change nothing.

use crate::config::Config;
use crate::workflow::Workflow;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Arguments for `blobup check`.
#[derive(Args)]
pub struct CheckCommand {
    /// Device codenames to check; all configured devices when empty.
    codenames: Vec<String>,
}

impl CheckCommand {
    /// Resolve latest versions and print what is out of date.
    ///
    /// # Errors
    ///
    /// Propagates configuration and feed lookup errors.
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config = Config::load_with_optional(config_path)?;
        let workflow = Workflow::new(config)?;
        let reports = workflow.check(&self.codenames).await?;

        for report in &reports {
            let current = report.current.as_deref().unwrap_or("unknown");
            if report.is_current() {
                println!(
                    "  {} {} ({})",
                    format!("{}:", report.codename).cyan(),
                    "up to date".green(),
                    report.latest
                );
            } else {
                println!(
                    "  {} {} {current} -> {}",
                    format!("{}:", report.codename).cyan(),
                    "update available".yellow(),
                    report.latest
                );
            }
        }
        Ok(())
    }
}
