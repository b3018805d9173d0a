//! File-backed content store: one JSON document per identifier.
//!
//! `<state>/content/<id>.json`, written with the `.tmp` + rename pattern so a
//! reader never observes a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};
use crate::store::ContentStore;
use crate::types::{ContentRecord, DocId};

#[derive(Debug, Clone)]
pub struct FsContentStore {
    dir: PathBuf,
}

impl FsContentStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<id>.json` — pure, no I/O.
    pub fn record_path(&self, id: &DocId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }
}

impl ContentStore for FsContentStore {
    fn put(&mut self, record: ContentRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id);
        let tmp = path.with_file_name(format!("{}.json.tmp", record.id.as_str()));
        let json = serde_json::to_vec(&record)?;
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    fn get(&self, id: &DocId) -> Result<Option<ContentRecord>, StoreError> {
        let path = self.record_path(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path,
                line: 1,
                source,
            })
    }

    fn delete(&mut self, id: &DocId) -> Result<bool, StoreError> {
        let path = self.record_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    fn contains(&self, id: &DocId) -> Result<bool, StoreError> {
        let path = self.record_path(id);
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path, err)),
        }
    }
}
