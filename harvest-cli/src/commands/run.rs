//! `harvest run` — one full reconciliation plus archive pass.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use harvest_eutils::EutilsClient;
use harvest_sync::{Pipeline, Remote, RunRecord};

use super::ConfigArg;

/// Arguments for `harvest run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Do not run the archive pass even when `archive_dir` is set.
    #[arg(long)]
    pub skip_archive: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let (config, paths) = self.config.load()?;
        let client = EutilsClient::new(&config.remote).context("failed to build E-utilities client")?;
        let remote = Remote {
            corpus: &client,
            content: &client,
        };

        let record = Pipeline::new(&config, &paths)
            .run(remote, self.skip_archive)
            .context("failed to write run log")?;
        print_record(&record);

        if record.is_broken() {
            bail!(
                "run {} broken: {}",
                record.run_id,
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}

fn print_record(record: &RunRecord) {
    let status = if record.is_broken() {
        record.status.to_string().red().bold()
    } else {
        record.status.to_string().green().bold()
    };
    println!("Run {} {}", record.run_id, status);
    println!(
        "  {} new | {} retired | {} archived | {} recovered",
        record.counts.new, record.counts.retired, record.counts.archived, record.counts.recovered
    );
    if record.counts.skipped > 0 {
        println!(
            "  {}",
            format!("{} archive artifacts skipped", record.counts.skipped).yellow()
        );
    }
    if let Some(totals) = record.totals {
        println!(
            "  Totals: {} present | {} pending | {} absent | {} archived",
            totals.present, totals.pending, totals.absent, totals.archived
        );
    }
}
