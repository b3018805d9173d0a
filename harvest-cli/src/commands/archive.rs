//! `harvest archive` — archive pass on its own.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use harvest_sync::Pipeline;

use super::ConfigArg;

/// Arguments for `harvest archive`.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

impl ArchiveArgs {
    pub fn run(self) -> Result<()> {
        let (config, paths) = self.config.load()?;
        let summary = Pipeline::new(&config, &paths)
            .archive()
            .context("archive pass failed")?;

        println!(
            "✓ {} archived ({} archive files scanned)",
            summary.archived, summary.scanned
        );
        for path in &summary.skipped {
            println!("  {} {}", "skipped".yellow(), path.display());
        }
        Ok(())
    }
}
