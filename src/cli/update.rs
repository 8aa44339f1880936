//! The `update` command: run the full pipeline.

use crate::config::Config;
use crate::workflow::Workflow;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Arguments for `blobup update`.
#[derive(Args)]
pub struct UpdateCommand {
    /// Device codenames to update; all configured devices when empty.
    codenames: Vec<String>,
}

impl UpdateCommand {
    /// Run the update pipeline and print a per-device summary.
    ///
    /// # Errors
    ///
    /// Propagates configuration and pipeline errors. The first fatal error
    /// aborts the remaining devices.
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config = Config::load_with_optional(config_path)?;
        let workflow = Workflow::new(config)?;
        let outcomes = workflow.run(&self.codenames).await?;

        println!("{}", "Update summary".bold());
        for (codename, outcome) in &outcomes {
            println!("  {} {outcome}", format!("{codename}:").cyan());
        }
        Ok(())
    }
}
