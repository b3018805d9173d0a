//! Error types for harvest-sync.

use std::path::PathBuf;

use thiserror::Error;

use harvest_core::{ConfigError, DocId, RemoteError, StoreError};

/// All errors that can abort a reconciliation or archive run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the record or content store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A non-transient remote failure; never retried.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// A transient failure persisted past the backoff ceiling.
    #[error("{last} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: RemoteError,
    },

    /// The listing yielded a different number of ids than it reported.
    #[error("listing reported {expected} ids but its pages yielded {actual}")]
    ListingMismatch { expected: usize, actual: usize },

    /// A later listing page reported a different total than the first.
    #[error("listing total changed from {first} to {now} at offset {offset}")]
    ListingTotalChanged {
        first: usize,
        now: usize,
        offset: usize,
    },

    /// A fetch returned a different number of documents than requested.
    #[error("requested {requested} documents but received {returned}")]
    CountMismatch { requested: usize, returned: usize },

    #[error("batch of {size} ids exceeds the maximum of {max}")]
    OversizeBatch { size: usize, max: usize },

    /// An identifier that cannot be used as a file name.
    #[error("identifier {0:?} is not file-name safe")]
    UnsafeId(DocId),

    /// Ids staged PENDING were not all accounted for after the fetch pass.
    #[error("{pending} ids were marked pending but only {present} reached present")]
    Inconsistent { pending: usize, present: usize },

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid dedupe pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error while reading or writing the run log.
    #[error("run log JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
