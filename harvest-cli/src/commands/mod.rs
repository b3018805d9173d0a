//! Subcommand implementations and the config-location flag they share.

pub mod archive;
pub mod init;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use harvest_core::config::{self, ResolvedPaths};
use harvest_core::HarvestConfig;

/// `--config <path>`; defaults to `~/.harvest/config.yaml`.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the configuration file.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => {
                let home = config::home().context("could not determine home directory")?;
                Ok(config::config_path_at(&home))
            }
        }
    }

    /// Load and validate the config, resolving its paths against the
    /// directory that holds it.
    pub fn load(&self) -> Result<(HarvestConfig, ResolvedPaths)> {
        let path = self.path()?;
        let loaded = config::load_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let paths = loaded.resolve_paths(base);
        tracing::debug!(config = %path.display(), state = %paths.state_dir.display(), "loaded config");
        Ok((loaded, paths))
    }
}
