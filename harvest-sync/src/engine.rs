//! Reconciliation engine: recovery, retire and fetch passes.
//!
//! ```text
//!   list R ──► snapshot L ──► recover ──► retire ──► stage PENDING ──► fetch batches
//!   (fatal        (scan)       PENDING +   PRESENT∖R     R∖settled        ≤ B, sequential
//!    before any                incomplete                                file → content → PRESENT
//!    mutation)                 PRESENT
//!                              purged
//! ```
//!
//! Only mutations whose side effects have completed are ever staged, so on a
//! fatal error the writer's buffer is flushed before the error is returned.
//! Anything left PENDING, and any PRESENT record whose file or content was
//! already purged when the run died, is picked up by the next run's recovery
//! pass.
//!
//! Precondition: the engine holds exclusive write access to the record store
//! for the whole run. Nothing here enforces it.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::Serialize;

use harvest_core::{
    ContentRecord, ContentSource, ContentStore, CorpusSource, DocId, DocStatus, DocumentRecord,
    Mutation, RecordStore, RunStamp,
};

use crate::artifacts::{sha256_hex, ArtifactDir};
use crate::backoff::{BackoffPolicy, CancelToken, Retrier, Sleeper, ThreadSleeper};
use crate::batch_writer::BatchWriter;
use crate::error::SyncError;
use crate::fetcher::ContentFetcher;
use crate::lister::IdLister;

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// The two remote collaborators.
#[derive(Clone, Copy)]
pub struct Remote<'a> {
    pub corpus: &'a dyn CorpusSource,
    pub content: &'a dyn ContentSource,
}

/// Local state the engine mutates.
pub struct Local<'a> {
    pub records: &'a mut dyn RecordStore,
    pub blobs: &'a mut dyn ContentStore,
    pub artifacts: &'a ArtifactDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub page_size: usize,
    pub batch_size: usize,
    pub write_buffer: usize,
    pub backoff: BackoffPolicy,
}

impl From<&harvest_core::HarvestConfig> for EngineSettings {
    fn from(config: &harvest_core::HarvestConfig) -> Self {
        Self {
            page_size: config.page_size,
            batch_size: config.batch_size,
            write_buffer: config.write_buffer,
            backoff: BackoffPolicy::from(&config.backoff),
        }
    }
}

/// Counts produced by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Distinct ids in the remote listing.
    pub listed: usize,
    /// Incomplete records found at start and purged: PENDING, or PRESENT
    /// with its working file or content record missing.
    pub recovered: usize,
    /// Documents fetched and marked PRESENT.
    pub fetched: usize,
    /// PRESENT records retired to ABSENT.
    pub retired: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    remote: Remote<'a>,
    local: Local<'a>,
    settings: EngineSettings,
    stamp: RunStamp,
    sleeper: &'a dyn Sleeper,
    cancel: CancelToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(remote: Remote<'a>, local: Local<'a>, settings: EngineSettings, stamp: RunStamp) -> Self {
        Self {
            remote,
            local,
            settings,
            stamp,
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

    /// Run one full reconciliation.
    pub fn run(self) -> Result<ReconcileSummary, SyncError> {
        let Reconciler {
            remote,
            local,
            settings,
            stamp,
            sleeper,
            cancel,
        } = self;
        let retrier = Retrier::new(settings.backoff, sleeper, &cancel);

        let remote_ids = IdLister::new(remote.corpus, settings.page_size, retrier).list_all()?;

        let all = |_: &DocumentRecord| true;
        let snapshot: BTreeMap<DocId, DocStatus> = local
            .records
            .scan(&all)?
            .map(|record| (record.id, record.status))
            .collect();

        let mut pass = Pass {
            writer: BatchWriter::new(local.records, settings.write_buffer),
            blobs: local.blobs,
            artifacts: local.artifacts,
            stamp,
            summary: ReconcileSummary {
                listed: remote_ids.len(),
                ..ReconcileSummary::default()
            },
        };
        let fetcher = ContentFetcher::new(remote.content, settings.batch_size, retrier);

        match pass.all(snapshot, &remote_ids, &fetcher, settings.batch_size, &cancel) {
            Ok(()) => {
                tracing::info!(
                    listed = pass.summary.listed,
                    recovered = pass.summary.recovered,
                    fetched = pass.summary.fetched,
                    retired = pass.summary.retired,
                    "reconciliation finished",
                );
                Ok(pass.summary)
            }
            Err(err) => {
                if let Err(flush_err) = pass.writer.flush_remaining() {
                    tracing::error!(error = %flush_err, "flush after fatal error failed");
                }
                Err(err)
            }
        }
    }
}

struct Pass<'w, 'a> {
    writer: BatchWriter<'w>,
    blobs: &'a mut dyn ContentStore,
    artifacts: &'a ArtifactDir,
    stamp: RunStamp,
    summary: ReconcileSummary,
}

impl Pass<'_, '_> {
    fn all(
        &mut self,
        mut local: BTreeMap<DocId, DocStatus>,
        remote_ids: &[DocId],
        fetcher: &ContentFetcher<'_>,
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<(), SyncError> {
        let remote: HashSet<&DocId> = remote_ids.iter().collect();
        self.recover(&mut local, &remote)?;
        self.retire(&local, &remote)?;
        self.fetch(&local, remote_ids, fetcher, batch_size, cancel)
    }

    /// Purge every incomplete record: PENDING ones, and PRESENT ones whose
    /// working file or content record is gone (a retire that never reached
    /// the store). Ids still listed drop out of `local` so the fetch pass
    /// picks them up again; the rest retire.
    fn recover(
        &mut self,
        local: &mut BTreeMap<DocId, DocStatus>,
        remote: &HashSet<&DocId>,
    ) -> Result<(), SyncError> {
        self.artifacts.sweep_temp()?;

        let mut incomplete = Vec::new();
        for (id, status) in local.iter() {
            let broken = match status {
                DocStatus::Pending => true,
                DocStatus::Present => !self.artifacts.exists(id) || !self.blobs.contains(id)?,
                DocStatus::Absent | DocStatus::Archived => false,
            };
            if broken {
                incomplete.push(id.clone());
            }
        }

        for id in incomplete {
            self.purge(&id)?;
            if remote.contains(&id) {
                local.remove(&id);
            } else {
                self.writer.stage(Mutation::SetStatus {
                    id: id.clone(),
                    status: DocStatus::Absent,
                    stamp: self.stamp.clone(),
                })?;
                local.insert(id, DocStatus::Absent);
            }
            self.summary.recovered += 1;
        }
        self.writer.flush_remaining()?;
        if self.summary.recovered > 0 {
            tracing::warn!(recovered = self.summary.recovered, "recovered interrupted fetches");
        }
        Ok(())
    }

    /// PRESENT ∖ R → ABSENT.
    fn retire(
        &mut self,
        local: &BTreeMap<DocId, DocStatus>,
        remote: &HashSet<&DocId>,
    ) -> Result<(), SyncError> {
        for (id, status) in local {
            if *status != DocStatus::Present || remote.contains(id) {
                continue;
            }
            self.purge(id)?;
            self.writer.stage(Mutation::SetStatus {
                id: id.clone(),
                status: DocStatus::Absent,
                stamp: self.stamp.clone(),
            })?;
            self.summary.retired += 1;
        }
        self.writer.flush_remaining()?;
        tracing::info!(retired = self.summary.retired, "retire pass done");
        Ok(())
    }

    /// Stage PENDING for every unsettled listed id, then fetch in batches.
    fn fetch(
        &mut self,
        local: &BTreeMap<DocId, DocStatus>,
        remote_ids: &[DocId],
        fetcher: &ContentFetcher<'_>,
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<(), SyncError> {
        let wanted: Vec<DocId> = remote_ids
            .iter()
            .filter(|id| !local.get(*id).is_some_and(|status| status.is_settled()))
            .cloned()
            .collect();

        for id in &wanted {
            self.writer.stage(Mutation::Upsert(DocumentRecord::new(
                id.clone(),
                DocStatus::Pending,
                &self.stamp,
            )))?;
        }
        self.writer.flush_remaining()?;
        tracing::info!(pending = wanted.len(), "fetch pass staged");

        for batch in wanted.chunks(batch_size.max(1)) {
            cancel.check()?;
            for (id, content) in fetcher.fetch(batch)? {
                self.artifacts.write(&id, &content)?;
                self.blobs.put(ContentRecord {
                    id: id.clone(),
                    sha256: sha256_hex(&content),
                    size: content.len() as u64,
                    stored_at: Utc::now(),
                    content,
                })?;
                self.writer.stage(Mutation::SetStatus {
                    id,
                    status: DocStatus::Present,
                    stamp: self.stamp.clone(),
                })?;
                self.summary.fetched += 1;
            }
            tracing::debug!(fetched = self.summary.fetched, of = wanted.len(), "batch stored");
        }
        self.writer.flush_remaining()?;

        if self.summary.fetched != wanted.len() {
            return Err(SyncError::Inconsistent {
                pending: wanted.len(),
                present: self.summary.fetched,
            });
        }
        Ok(())
    }

    /// Remove the working file and content record. Failures are fatal.
    fn purge(&mut self, id: &DocId) -> Result<(), SyncError> {
        self.artifacts.remove(id)?;
        self.blobs.delete(id)?;
        Ok(())
    }
}
