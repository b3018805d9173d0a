//! Working-directory artifacts: one file per document id.
//!
//! ## `write` protocol
//!
//! 1. Write the content to `<id><ext>.tmp`.
//! 2. Rename to `<id><ext>` (atomic on POSIX).
//! 3. Remove the temp file if the rename fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use harvest_core::DocId;

use crate::error::{io_err, SyncError};

#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
    extension: String,
}

impl ArtifactDir {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, SyncError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self {
            root,
            extension: extension.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<id><ext>` — pure, no I/O.
    pub fn path_for(&self, id: &DocId) -> PathBuf {
        self.root.join(format!("{}{}", id.as_str(), self.extension))
    }

    pub fn write(&self, id: &DocId, content: &[u8]) -> Result<PathBuf, SyncError> {
        if !id.is_file_safe() {
            return Err(SyncError::UnsafeId(id.clone()));
        }
        let path = self.path_for(id);
        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        tracing::debug!("wrote: {}", path.display());
        Ok(path)
    }

    /// Delete the artifact. A file that is already gone returns `Ok(false)`.
    pub fn remove(&self, id: &DocId) -> Result<bool, SyncError> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// `true` when anything occupies the artifact's path.
    pub fn exists(&self, id: &DocId) -> bool {
        self.path_for(id).exists()
    }

    /// Delete `<id><ext>.tmp` leftovers of interrupted writes. Returns how
    /// many were removed.
    pub fn sweep_temp(&self) -> Result<usize, SyncError> {
        let suffix = format!("{}.tmp", self.extension);
        let entries = std::fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.root, e))?.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&suffix));
            if is_temp && path.is_file() {
                std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::warn!(removed, root = %self.root.display(), "removed stale temp artifacts");
        }
        Ok(removed)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
