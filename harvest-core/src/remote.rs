//! Interface boundary to the remote corpus.
//!
//! The engine never talks HTTP directly; it drives these two traits. The
//! E-utilities client in `harvest-eutils` is the production implementation,
//! tests substitute in-memory fakes.

use crate::error::RemoteError;
use crate::types::DocId;

/// One page of a count-and-page listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPage {
    /// Total number of identifiers the source reports for the whole query.
    pub total: usize,
    /// Identifiers at `[offset, offset + limit)`.
    pub ids: Vec<DocId>,
}

/// Source of the current corpus membership.
pub trait CorpusSource {
    /// Return the identifiers at `[offset, offset + limit)` plus the total count.
    fn page(&self, offset: usize, limit: usize) -> Result<IdPage, RemoteError>;

    /// Human-readable description of the query, used in logs and errors.
    fn describe(&self) -> String;
}

/// Source of document content.
pub trait ContentSource {
    /// Fetch the content for `ids` in one round trip.
    ///
    /// Returns one blob per delivered document in request order. The caller
    /// checks that the count matches `ids.len()`.
    fn fetch(&self, ids: &[DocId]) -> Result<Vec<Vec<u8>>, RemoteError>;
}
