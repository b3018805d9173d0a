//! Batched content retrieval with retry and count verification.

use harvest_core::{ContentSource, DocId};

use crate::backoff::Retrier;
use crate::error::SyncError;

pub struct ContentFetcher<'a> {
    source: &'a dyn ContentSource,
    max_batch: usize,
    retrier: Retrier<'a>,
}

impl<'a> ContentFetcher<'a> {
    pub fn new(source: &'a dyn ContentSource, max_batch: usize, retrier: Retrier<'a>) -> Self {
        Self {
            source,
            max_batch,
            retrier,
        }
    }

    /// Fetch one batch and pair each blob with its id by position.
    ///
    /// The batch is rejected whole when the source returns a different number
    /// of documents than requested.
    pub fn fetch(&self, batch: &[DocId]) -> Result<Vec<(DocId, Vec<u8>)>, SyncError> {
        if batch.len() > self.max_batch {
            return Err(SyncError::OversizeBatch {
                size: batch.len(),
                max: self.max_batch,
            });
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let blobs = self.retrier.run("fetch", || self.source.fetch(batch))?;
        if blobs.len() != batch.len() {
            tracing::error!(
                requested = batch.len(),
                returned = blobs.len(),
                first = %batch[0],
                "fetch count mismatch",
            );
            return Err(SyncError::CountMismatch {
                requested: batch.len(),
                returned: blobs.len(),
            });
        }
        Ok(batch.iter().cloned().zip(blobs).collect())
    }
}
