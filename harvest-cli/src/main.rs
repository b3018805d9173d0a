//! Harvest — keep a local mirror of a remote corpus subset in sync.
//!
//! # Usage
//!
//! ```text
//! harvest init [--config <path>] [--force]
//! harvest run [--config <path>] [--skip-archive]
//! harvest archive [--config <path>]
//! harvest status [--config <path>] [--json] [--runs <n>]
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG` (e.g. `RUST_LOG=debug`) to change
//! the level.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{archive::ArchiveArgs, init::InitArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    version,
    about = "Mirror a remote document corpus into a local working directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init(InitArgs),

    /// Reconcile the local mirror with the remote corpus, then archive.
    Run(RunArgs),

    /// Match PRESENT documents against the archive directory only.
    Archive(ArchiveArgs),

    /// Show per-status totals and recent runs.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Run(args) => args.run(),
        Commands::Archive(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
