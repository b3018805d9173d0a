//! `harvest init [--config <path>] [--force]`

use anyhow::{bail, Context, Result};
use clap::Args;

use harvest_core::{config, HarvestConfig};

use super::ConfigArg;

/// Write a default configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        if path.exists() && !self.force {
            bail!(
                "config already exists at {}; pass --force to overwrite",
                path.display()
            );
        }

        let defaults = HarvestConfig::default();
        config::save_to(&path, &defaults)
            .with_context(|| format!("failed to write config to {}", path.display()))?;

        println!("✓ Wrote {}", path.display());
        println!(
            "  Query: {} on {} | batch {} | page {}",
            defaults.remote.query, defaults.remote.database, defaults.batch_size, defaults.page_size
        );
        println!("  Set `archive_dir` to enable the archive pass.");
        Ok(())
    }
}
