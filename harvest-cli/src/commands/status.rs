//! `harvest status` — record totals and recent runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use harvest_core::{DocStatus, StatusCounts};
use harvest_sync::{Pipeline, RunRecord, RunStatus, StatusReport};

/// Arguments for `harvest status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: super::ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Number of recent runs to show.
    #[arg(long, default_value_t = 10)]
    pub runs: usize,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let (config, paths) = self.config.load()?;
        let report = Pipeline::new(&config, &paths)
            .status(self.runs)
            .context("failed to read harvest state")?;

        if self.json {
            print_json(&config.remote.query, report)?;
            return Ok(());
        }
        print_table(&config.remote.query, report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    query: &'a str,
    totals: StatusCounts,
    runs: Vec<RunRecord>,
}

#[derive(Tabled)]
struct TotalRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "documents")]
    count: usize,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "run")]
    run_id: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "new")]
    new: usize,
    #[tabled(rename = "retired")]
    retired: usize,
    #[tabled(rename = "archived")]
    archived: usize,
    #[tabled(rename = "duration")]
    duration: String,
}

fn print_json(query: &str, report: StatusReport) -> Result<()> {
    let payload = StatusJson {
        query,
        totals: report.totals,
        runs: report.runs,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(query: &str, report: StatusReport) {
    println!(
        "Harvest v{} | {} | {} documents",
        env!("CARGO_PKG_VERSION"),
        query,
        report.totals.total(),
    );

    let totals: Vec<TotalRow> = DocStatus::all()
        .iter()
        .map(|status| TotalRow {
            status: status.to_string(),
            count: report.totals.get(*status),
        })
        .collect();
    let mut table = Table::new(totals);
    table.with(Style::rounded());
    println!("{table}");

    if report.runs.is_empty() {
        println!("No runs yet. Run `harvest run` to start.");
        return;
    }

    let rows: Vec<RunRow> = report
        .runs
        .iter()
        .map(|run| RunRow {
            run_id: run.run_id.clone(),
            status: status_label(run.status),
            new: run.counts.new,
            retired: run.counts.retired,
            archived: run.counts.archived,
            duration: format_duration(run.started_at, run.finished_at),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(err) = report.runs.first().and_then(|run| run.error.as_deref()) {
        println!("{} {}", "last error:".red(), err);
    }
}

fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Finished => status.to_string().green().to_string(),
        RunStatus::Broken => status.to_string().red().to_string(),
        RunStatus::Processing => status.to_string().yellow().to_string(),
    }
}

fn format_duration(started: DateTime<Utc>, finished: Option<DateTime<Utc>>) -> String {
    let Some(finished) = finished else {
        return "-".to_string();
    };
    let secs = (finished - started).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn durations_are_humanized() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_duration(start, None), "-");
        assert_eq!(format_duration(start, Some(start + Duration::seconds(42))), "42s");
        assert_eq!(format_duration(start, Some(start + Duration::seconds(125))), "2m 5s");
        assert_eq!(format_duration(start, Some(start + Duration::seconds(7260))), "2h 1m");
    }
}
