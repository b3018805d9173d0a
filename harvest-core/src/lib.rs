//! Harvest core library — domain types, stores, configuration, errors.
//!
//! - [`types`] — identifiers, statuses and records
//! - [`store`] — [`RecordStore`] / [`ContentStore`] seams
//! - [`journal`] — JSON-lines [`JournalRecordStore`]
//! - [`content`] — one-file-per-id [`FsContentStore`]
//! - [`remote`] — [`CorpusSource`] / [`ContentSource`] seams
//! - [`config`] — YAML configuration load / save / validate

pub mod config;
pub mod content;
pub mod error;
pub mod journal;
pub mod remote;
pub mod store;
pub mod types;

pub use config::HarvestConfig;
pub use content::FsContentStore;
pub use error::{ConfigError, RemoteError, StoreError};
pub use journal::JournalRecordStore;
pub use remote::{ContentSource, CorpusSource, IdPage};
pub use store::{ContentStore, Mutation, RecordStore, StatusCounts};
pub use types::{ContentRecord, DocId, DocStatus, DocumentRecord, RunStamp};
