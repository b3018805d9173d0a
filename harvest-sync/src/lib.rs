//! # harvest-sync
//!
//! Reconciliation of a local mirror against a remote corpus.
//!
//! Call [`Pipeline::run`] for a full run (listing, recovery, retire, fetch,
//! archive) with a run record, or drive [`Reconciler`] and [`ArchiveSync`]
//! directly with your own stores.

pub mod archive;
pub mod artifacts;
pub mod backoff;
pub mod batch_writer;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod lister;
pub mod pipeline;
pub mod run_log;

pub use archive::{ArchiveSummary, ArchiveSync, DedupeKeyExtractor, PatternExtractor};
pub use artifacts::ArtifactDir;
pub use backoff::{BackoffPolicy, CancelToken, Retrier, Sleeper, ThreadSleeper};
pub use batch_writer::BatchWriter;
pub use engine::{EngineSettings, Local, ReconcileSummary, Reconciler, Remote};
pub use error::SyncError;
pub use fetcher::ContentFetcher;
pub use lister::IdLister;
pub use pipeline::{Pipeline, StatusReport};
pub use run_log::{RunCounts, RunLog, RunRecord, RunStatus};
