//! Buffered record-store writes.
//!
//! Mutations are staged and applied in groups of `threshold`. Callers must
//! invoke [`BatchWriter::flush_remaining`] at the end of every phase; a writer
//! dropped with staged mutations loses them and says so in the log.

use harvest_core::{Mutation, RecordStore, StoreError};

pub struct BatchWriter<'s> {
    store: &'s mut dyn RecordStore,
    threshold: usize,
    staged: Vec<Mutation>,
    flushed: usize,
}

impl<'s> BatchWriter<'s> {
    pub fn new(store: &'s mut dyn RecordStore, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            threshold,
            staged: Vec::with_capacity(threshold),
            flushed: 0,
        }
    }

    /// Buffer `mutation`, flushing once the buffer reaches the threshold.
    pub fn stage(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        self.staged.push(mutation);
        if self.staged.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Apply everything staged so far as one store write.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::take(&mut self.staged);
        let n = batch.len();
        self.store.apply(batch)?;
        self.flushed += n;
        tracing::debug!(mutations = n, "flushed record batch");
        Ok(n)
    }

    /// End-of-phase flush.
    pub fn flush_remaining(&mut self) -> Result<usize, StoreError> {
        self.flush()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Mutations applied over the writer's lifetime.
    pub fn flushed_total(&self) -> usize {
        self.flushed
    }

    /// Read access to the wrapped store. Staged mutations are not visible.
    pub fn store(&self) -> &dyn RecordStore {
        &*self.store
    }
}

impl Drop for BatchWriter<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            tracing::warn!(
                lost = self.staged.len(),
                "batch writer dropped with unflushed mutations",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use harvest_core::{DocId, DocStatus, DocumentRecord, JournalRecordStore, RunStamp};
    use tempfile::TempDir;

    fn upsert(id: usize) -> Mutation {
        let stamp = RunStamp::new(Utc::now(), "p", "o");
        Mutation::Upsert(DocumentRecord::new(
            DocId::from(id.to_string()),
            DocStatus::Pending,
            &stamp,
        ))
    }

    #[test]
    fn flushes_at_threshold_and_on_demand() {
        let tmp = TempDir::new().unwrap();
        let mut store = JournalRecordStore::open(tmp.path().join("r.jsonl")).unwrap();
        {
            let mut writer = BatchWriter::new(&mut store, 3);
            for i in 0..7 {
                writer.stage(upsert(i)).unwrap();
            }
            assert_eq!(writer.flushed_total(), 6);
            assert_eq!(writer.staged_len(), 1);
            assert_eq!(writer.store().status_counts().unwrap().pending, 6);

            assert_eq!(writer.flush_remaining().unwrap(), 1);
            assert_eq!(writer.flush_remaining().unwrap(), 0);
        }
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let tmp = TempDir::new().unwrap();
        let mut store = JournalRecordStore::open(tmp.path().join("r.jsonl")).unwrap();
        let mut writer = BatchWriter::new(&mut store, 0);
        writer.stage(upsert(1)).unwrap();
        assert_eq!(writer.staged_len(), 0);
    }

    #[test]
    fn failed_flush_reports_the_store_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = JournalRecordStore::open(tmp.path().join("r.jsonl")).unwrap();
        let mut writer = BatchWriter::new(&mut store, 10);
        writer
            .stage(Mutation::SetStatus {
                id: DocId::from("missing"),
                status: DocStatus::Present,
                stamp: RunStamp::new(Utc::now(), "p", "o"),
            })
            .unwrap();
        assert!(matches!(writer.flush_remaining(), Err(StoreError::MissingRecord(_))));
        assert_eq!(writer.staged_len(), 0);
    }
}
