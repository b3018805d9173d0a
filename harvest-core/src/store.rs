//! Record and content store seams.
//!
//! Engines receive stores as `&mut dyn RecordStore` / `&mut dyn ContentStore`;
//! the file-backed implementations live in [`crate::journal`] and
//! [`crate::content`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{ContentRecord, DocId, DocStatus, DocumentRecord, RunStamp};

/// A single staged change to the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace the whole record.
    Upsert(DocumentRecord),
    /// Change only the status, restamping date/hour and attribution.
    SetStatus {
        id: DocId,
        status: DocStatus,
        stamp: RunStamp,
    },
}

impl Mutation {
    pub fn id(&self) -> &DocId {
        match self {
            Mutation::Upsert(record) => &record.id,
            Mutation::SetStatus { id, .. } => id,
        }
    }
}

/// Key-value store of per-identifier metadata records.
///
/// Every operation is idempotent: applying the same mutation twice leaves the
/// store in the same state as applying it once.
pub trait RecordStore {
    fn get(&self, id: &DocId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Apply a batch of mutations as one write.
    ///
    /// A `SetStatus` for an unknown id fails the whole batch with
    /// [`StoreError::MissingRecord`] before anything is written.
    fn apply(&mut self, mutations: Vec<Mutation>) -> Result<(), StoreError>;

    /// Lazily iterate over the records matching `predicate`, in id order.
    fn scan<'a>(
        &'a self,
        predicate: &'a dyn Fn(&DocumentRecord) -> bool,
    ) -> Result<Box<dyn Iterator<Item = DocumentRecord> + 'a>, StoreError>;

    /// Remove a record. Returns `false` when there was nothing to remove.
    fn delete(&mut self, id: &DocId) -> Result<bool, StoreError>;

    fn upsert(&mut self, record: DocumentRecord) -> Result<(), StoreError> {
        self.apply(vec![Mutation::Upsert(record)])
    }

    /// Ids of all records currently in `status`.
    fn ids_with_status(&self, status: DocStatus) -> Result<Vec<DocId>, StoreError> {
        let predicate = move |r: &DocumentRecord| r.status == status;
        let ids = self.scan(&predicate)?.map(|r| r.id).collect();
        Ok(ids)
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let all = |_: &DocumentRecord| true;
        let mut counts = StatusCounts::default();
        for record in self.scan(&all)? {
            counts.add(record.status);
        }
        Ok(counts)
    }
}

/// Store of opaque content blobs keyed by document id.
pub trait ContentStore {
    fn put(&mut self, record: ContentRecord) -> Result<(), StoreError>;
    fn get(&self, id: &DocId) -> Result<Option<ContentRecord>, StoreError>;
    /// Remove the content record. Returns `false` if none existed.
    fn delete(&mut self, id: &DocId) -> Result<bool, StoreError>;
    fn contains(&self, id: &DocId) -> Result<bool, StoreError>;
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub present: usize,
    pub absent: usize,
    pub archived: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: DocStatus) {
        match status {
            DocStatus::Pending => self.pending += 1,
            DocStatus::Present => self.present += 1,
            DocStatus::Absent => self.absent += 1,
            DocStatus::Archived => self.archived += 1,
        }
    }

    pub fn get(&self, status: DocStatus) -> usize {
        match status {
            DocStatus::Pending => self.pending,
            DocStatus::Present => self.present,
            DocStatus::Absent => self.absent,
            DocStatus::Archived => self.archived,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.present + self.absent + self.archived
    }
}

/// Resolve `mutations` against `records`, returning the full record each one
/// produces, in order. A `SetStatus` may follow an `Upsert` for the same id
/// within one batch. `records` is only read; callers insert the result once
/// the batch is durable.
pub(crate) fn resolve_mutations(
    records: &BTreeMap<DocId, DocumentRecord>,
    mutations: Vec<Mutation>,
) -> Result<Vec<DocumentRecord>, StoreError> {
    let mut touched: BTreeMap<DocId, DocumentRecord> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        let record = match mutation {
            Mutation::Upsert(record) => record,
            Mutation::SetStatus { id, status, stamp } => {
                let mut record = touched
                    .get(&id)
                    .or_else(|| records.get(&id))
                    .cloned()
                    .ok_or_else(|| StoreError::MissingRecord(id.clone()))?;
                record.restamp(status, &stamp);
                record
            }
        };
        touched.insert(record.id.clone(), record.clone());
        resolved.push(record);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stamp() -> RunStamp {
        RunStamp::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(), "p", "o")
    }

    #[test]
    fn set_status_after_upsert_in_same_batch() {
        let records = BTreeMap::new();
        let id = DocId::from("1");
        let resolved = resolve_mutations(
            &records,
            vec![
                Mutation::Upsert(DocumentRecord::new(id.clone(), DocStatus::Pending, &stamp())),
                Mutation::SetStatus {
                    id: id.clone(),
                    status: DocStatus::Present,
                    stamp: stamp(),
                },
            ],
        )
        .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].status, DocStatus::Present);
        assert_eq!(resolved[1].id, id);
    }

    #[test]
    fn missing_record_fails_the_whole_batch() {
        let records = BTreeMap::new();
        let err = resolve_mutations(
            &records,
            vec![
                Mutation::Upsert(DocumentRecord::new(DocId::from("1"), DocStatus::Pending, &stamp())),
                Mutation::SetStatus {
                    id: DocId::from("2"),
                    status: DocStatus::Present,
                    stamp: stamp(),
                },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::MissingRecord(ref id) if id.as_str() == "2"));
    }

    #[test]
    fn status_counts_accumulate() {
        let mut counts = StatusCounts::default();
        counts.add(DocStatus::Present);
        counts.add(DocStatus::Present);
        counts.add(DocStatus::Absent);
        assert_eq!(counts.get(DocStatus::Present), 2);
        assert_eq!(counts.total(), 3);
    }
}
