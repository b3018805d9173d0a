//! Paged listing of the remote corpus.

use std::collections::HashSet;

use harvest_core::{CorpusSource, DocId};

use crate::backoff::Retrier;
use crate::error::SyncError;

/// Lists every id in the remote corpus, one page at a time.
pub struct IdLister<'a> {
    source: &'a dyn CorpusSource,
    page_size: usize,
    retrier: Retrier<'a>,
}

impl<'a> IdLister<'a> {
    pub fn new(source: &'a dyn CorpusSource, page_size: usize, retrier: Retrier<'a>) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            retrier,
        }
    }

    /// The full id set in listing order.
    ///
    /// Fails if the pages disagree with the reported total, or if any id is
    /// not usable as a file name. Repeated ids collapse to their first
    /// occurrence.
    pub fn list_all(&self) -> Result<Vec<DocId>, SyncError> {
        let what = self.source.describe();
        let first = self
            .retrier
            .run(&what, || self.source.page(0, self.page_size))?;
        let total = first.total;
        let mut raw = first.ids;

        let mut offset = self.page_size;
        while offset < total {
            let page = self
                .retrier
                .run(&what, || self.source.page(offset, self.page_size))?;
            if page.total != total {
                return Err(SyncError::ListingTotalChanged {
                    first: total,
                    now: page.total,
                    offset,
                });
            }
            raw.extend(page.ids);
            offset += self.page_size;
        }

        if raw.len() != total {
            return Err(SyncError::ListingMismatch {
                expected: total,
                actual: raw.len(),
            });
        }

        let mut seen = HashSet::with_capacity(raw.len());
        let mut ids = Vec::with_capacity(raw.len());
        for id in raw {
            if !id.is_file_safe() {
                return Err(SyncError::UnsafeId(id));
            }
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        let duplicates = total - ids.len();
        if duplicates > 0 {
            tracing::warn!(query = %what, duplicates, "listing contained repeated ids");
        }
        tracing::info!(query = %what, listed = ids.len(), "listed remote corpus");
        Ok(ids)
    }
}
