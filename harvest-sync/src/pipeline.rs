//! Shared run entrypoint used by the CLI.
//!
//! Wires configuration, stores and remote collaborators together, writes the
//! run record around the engine, and turns any fatal error into a `broken`
//! record instead of an `Err`. `Err` is reserved for failures of the run log
//! itself.

use chrono::Utc;
use serde::Serialize;

use harvest_core::config::ResolvedPaths;
use harvest_core::{
    journal, ConfigError, FsContentStore, HarvestConfig, JournalRecordStore, RecordStore, RunStamp,
    StatusCounts,
};

use crate::archive::{ArchiveSummary, ArchiveSync, PatternExtractor};
use crate::artifacts::ArtifactDir;
use crate::backoff::{CancelToken, Sleeper, ThreadSleeper};
use crate::engine::{EngineSettings, Local, Reconciler, Remote};
use crate::error::SyncError;
use crate::run_log::{RunLog, RunRecord};

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Totals plus recent runs, as shown by `harvest status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub totals: StatusCounts,
    pub runs: Vec<RunRecord>,
}

struct Stores {
    records: JournalRecordStore,
    blobs: FsContentStore,
    artifacts: ArtifactDir,
}

impl Stores {
    fn open(config: &HarvestConfig, paths: &ResolvedPaths) -> Result<Self, SyncError> {
        Ok(Self {
            records: JournalRecordStore::open(paths.records_path())?,
            blobs: FsContentStore::open(paths.content_dir())?,
            artifacts: ArtifactDir::open(&paths.work_dir, config.artifact_extension.clone())?,
        })
    }
}

pub struct Pipeline<'a> {
    config: &'a HarvestConfig,
    paths: &'a ResolvedPaths,
    sleeper: &'a dyn Sleeper,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a HarvestConfig, paths: &'a ResolvedPaths) -> Self {
        Self {
            config,
            paths,
            sleeper: &THREAD_SLEEPER,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn stamp(&self) -> RunStamp {
        RunStamp::new(Utc::now(), self.config.process.clone(), self.config.owner.clone())
    }

    /// Reconcile, then run the archive pass when an archive directory is
    /// configured and `skip_archive` is false.
    pub fn run(&self, remote: Remote<'_>, skip_archive: bool) -> Result<RunRecord, SyncError> {
        let stamp = self.stamp();
        let log = RunLog::open(self.paths.runs_dir())?;
        let mut record = log.begin(&stamp)?;
        tracing::info!(run_id = %record.run_id, owner = %stamp.owner, "run started");

        let outcome = self.execute(remote, &stamp, skip_archive, &mut record);
        record.finish(outcome.as_ref().err());
        log.save(&record)?;

        match &outcome {
            Ok(()) => tracing::info!(
                run_id = %record.run_id,
                new = record.counts.new,
                retired = record.counts.retired,
                archived = record.counts.archived,
                "run finished",
            ),
            Err(err) => tracing::error!(run_id = %record.run_id, error = %err, "run broken"),
        }
        Ok(record)
    }

    fn execute(
        &self,
        remote: Remote<'_>,
        stamp: &RunStamp,
        skip_archive: bool,
        record: &mut RunRecord,
    ) -> Result<(), SyncError> {
        // Compiled up front so a bad pattern fails before any mutation.
        let extractor = PatternExtractor::new(&self.config.dedupe_pattern)?;
        let mut stores = Stores::open(self.config, self.paths)?;

        let outcome = self.passes(remote, stamp, skip_archive, &mut stores, &extractor, record);
        match stores.records.status_counts() {
            Ok(totals) => record.totals = Some(totals),
            Err(err) => tracing::warn!(error = %err, "could not compute totals"),
        }
        outcome
    }

    fn passes(
        &self,
        remote: Remote<'_>,
        stamp: &RunStamp,
        skip_archive: bool,
        stores: &mut Stores,
        extractor: &PatternExtractor,
        record: &mut RunRecord,
    ) -> Result<(), SyncError> {
        let local = Local {
            records: &mut stores.records,
            blobs: &mut stores.blobs,
            artifacts: &stores.artifacts,
        };
        let summary = Reconciler::new(remote, local, EngineSettings::from(self.config), stamp.clone())
            .with_sleeper(self.sleeper)
            .with_cancel(self.cancel.clone())
            .run()?;
        record.counts.recovered = summary.recovered;
        record.counts.new = summary.fetched;
        record.counts.retired = summary.retired;

        match &self.paths.archive_dir {
            Some(dir) if !skip_archive => {
                let archived = ArchiveSync::new(
                    &mut stores.records,
                    &stores.artifacts,
                    stamp.clone(),
                    self.config.write_buffer,
                )
                .relocate(dir, extractor)?;
                record.counts.archived = archived.archived;
                record.counts.skipped = archived.skipped.len();
            }
            Some(_) => tracing::info!("archive pass skipped"),
            None => tracing::debug!("no archive directory configured"),
        }
        Ok(())
    }

    /// Archive pass on its own.
    pub fn archive(&self) -> Result<ArchiveSummary, SyncError> {
        let dir = self.paths.archive_dir.as_ref().ok_or(ConfigError::Invalid {
            field: "archive_dir",
            reason: "not set; the archive pass needs a directory".to_string(),
        })?;
        let extractor = PatternExtractor::new(&self.config.dedupe_pattern)?;
        let mut stores = Stores::open(self.config, self.paths)?;
        ArchiveSync::new(
            &mut stores.records,
            &stores.artifacts,
            self.stamp(),
            self.config.write_buffer,
        )
        .relocate(dir, &extractor)
    }

    /// Record totals and the `runs` most recent run records. Read-only.
    pub fn status(&self, runs: usize) -> Result<StatusReport, SyncError> {
        let totals = journal::read_counts(&self.paths.records_path())?;
        let runs_dir = self.paths.runs_dir();
        let runs = if runs_dir.is_dir() {
            RunLog::open(runs_dir)?.list(runs)?
        } else {
            Vec::new()
        };
        Ok(StatusReport { totals, runs })
    }
}
