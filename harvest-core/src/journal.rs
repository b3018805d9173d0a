//! Append-only JSON-lines record store.
//!
//! # Layout
//!
//! ```text
//! <state>/records.jsonl     one JournalEntry per line
//! ```
//!
//! Every [`RecordStore::apply`] appends one line per mutation and syncs the
//! file once, so a batch costs a single write regardless of corpus size.
//! [`JournalRecordStore::open`] replays the journal (last entry per id wins,
//! deletes are tombstones) and compacts it: the live records are written to
//! `<path>.tmp`, synced, and renamed over the journal.
//!
//! A crash in the middle of an append can leave a torn final line. Replay drops
//! such a line with a warning; the PENDING marker in the surviving records is
//! what makes the lost mutations recoverable.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::store::{resolve_mutations, Mutation, RecordStore, StatusCounts};
use crate::types::{DocId, DocumentRecord};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalEntry {
    Upsert { record: DocumentRecord },
    Delete { id: DocId },
}

/// File-backed [`RecordStore`] with an in-memory index.
#[derive(Debug)]
pub struct JournalRecordStore {
    path: PathBuf,
    records: BTreeMap<DocId, DocumentRecord>,
    journal: File,
}

impl JournalRecordStore {
    /// Open (or create) the journal at `path`, replaying and compacting it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let records = replay(&path)?;
        compact(&path, &records)?;

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        tracing::debug!(path = %path.display(), records = records.len(), "opened record journal");
        Ok(Self {
            path,
            records,
            journal,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn append(&mut self, entries: &[JournalEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }
        self.journal
            .write_all(buf.as_bytes())
            .map_err(|e| io_err(&self.path, e))?;
        self.journal.sync_data().map_err(|e| io_err(&self.path, e))
    }
}

impl RecordStore for JournalRecordStore {
    fn get(&self, id: &DocId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.records.get(id).cloned())
    }

    fn apply(&mut self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        let resolved = resolve_mutations(&self.records, mutations)?;
        let entries: Vec<JournalEntry> = resolved
            .iter()
            .cloned()
            .map(|record| JournalEntry::Upsert { record })
            .collect();
        self.append(&entries)?;
        for record in resolved {
            self.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    fn scan<'a>(
        &'a self,
        predicate: &'a dyn Fn(&DocumentRecord) -> bool,
    ) -> Result<Box<dyn Iterator<Item = DocumentRecord> + 'a>, StoreError> {
        Ok(Box::new(
            self.records
                .values()
                .filter(move |record| predicate(*record))
                .cloned(),
        ))
    }

    fn delete(&mut self, id: &DocId) -> Result<bool, StoreError> {
        if !self.records.contains_key(id) {
            return Ok(false);
        }
        self.append(&[JournalEntry::Delete { id: id.clone() }])?;
        self.records.remove(id);
        Ok(true)
    }
}

/// Per-status totals of the journal at `path`, read without compacting it.
///
/// Safe to call while another process holds the store open.
pub fn read_counts(path: &Path) -> Result<StatusCounts, StoreError> {
    let mut counts = StatusCounts::default();
    for record in replay(path)?.values() {
        counts.add(record.status);
    }
    Ok(counts)
}

fn replay(path: &Path) -> Result<BTreeMap<DocId, DocumentRecord>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(io_err(path, err)),
    };

    let ends_clean = contents.is_empty() || contents.ends_with('\n');
    let lines: Vec<&str> = contents.lines().collect();
    let mut records = BTreeMap::new();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(JournalEntry::Upsert { record }) => {
                records.insert(record.id.clone(), record);
            }
            Ok(JournalEntry::Delete { id }) => {
                records.remove(&id);
            }
            Err(err) if idx + 1 == lines.len() && !ends_clean => {
                tracing::warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %err,
                    "dropping torn trailing journal entry",
                );
            }
            Err(source) => {
                return Err(StoreError::Corrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })
            }
        }
    }
    Ok(records)
}

fn compact(path: &Path, records: &BTreeMap<DocId, DocumentRecord>) -> Result<(), StoreError> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    let mut buf = String::new();
    for record in records.values() {
        let entry = JournalEntry::Upsert {
            record: record.clone(),
        };
        buf.push_str(&serde_json::to_string(&entry)?);
        buf.push('\n');
    }

    let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
    file.write_all(buf.as_bytes()).map_err(|e| io_err(&tmp, e))?;
    file.sync_all().map_err(|e| io_err(&tmp, e))?;
    drop(file);

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
