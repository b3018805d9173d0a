//! Per-invocation run records.
//!
//! ```text
//! <state>/runs/<run_id>.json     one RunRecord, rewritten atomically
//! ```
//!
//! A record is written as `processing` before any work starts and replaced by
//! `finished` or `broken` when the run ends, so a crash leaves a visible
//! `processing` entry behind.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{RunStamp, StatusCounts};

use crate::error::{io_err, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Processing,
    Finished,
    Broken,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Processing => write!(f, "processing"),
            RunStatus::Finished => write!(f, "finished"),
            RunStatus::Broken => write!(f, "broken"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub recovered: usize,
    pub new: usize,
    pub retired: usize,
    pub archived: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub process: String,
    pub owner: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub counts: RunCounts,
    /// Records per status once the run ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<StatusCounts>,
}

impl RunRecord {
    pub fn begin(stamp: &RunStamp) -> Self {
        Self {
            run_id: stamp.run_id(),
            process: stamp.process.clone(),
            owner: stamp.owner.clone(),
            status: RunStatus::Processing,
            started_at: stamp.started_at,
            finished_at: None,
            error: None,
            counts: RunCounts::default(),
            totals: None,
        }
    }

    /// Close the record as `finished` or, when `error` is set, `broken`.
    pub fn finish(&mut self, error: Option<&SyncError>) {
        self.finished_at = Some(Utc::now());
        match error {
            None => self.status = RunStatus::Finished,
            Some(err) => {
                self.status = RunStatus::Broken;
                self.error = Some(err.to_string());
            }
        }
    }

    pub fn is_broken(&self) -> bool {
        self.status == RunStatus::Broken
    }
}

/// Directory of run records.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<run_id>.json` — pure, no I/O.
    pub fn record_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Start a `processing` record for `stamp` and write it.
    ///
    /// The record file is claimed with `create_new`, so a second run starting
    /// within the same second gets `<run_id>_2`, `<run_id>_3`, … instead of
    /// replacing the first run's record.
    pub fn begin(&self, stamp: &RunStamp) -> Result<RunRecord, SyncError> {
        let mut record = RunRecord::begin(stamp);
        let base = record.run_id.clone();
        let mut n = 1;
        loop {
            let path = self.record_path(&record.run_id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    n += 1;
                    record.run_id = format!("{base}_{n}");
                }
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        self.save(&record)?;
        Ok(record)
    }

    /// Write (or replace) `record` atomically.
    pub fn save(&self, record: &RunRecord) -> Result<(), SyncError> {
        let path = self.record_path(&record.run_id);
        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    /// Up to `limit` records, newest first. Unreadable files are skipped.
    pub fn list(&self, limit: usize) -> Result<Vec<RunRecord>, SyncError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        paths.reverse();

        let mut records = Vec::new();
        for path in paths {
            if records.len() == limit {
                break;
            }
            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<RunRecord>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable run record")
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn stamp(minute: u32) -> RunStamp {
        RunStamp::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 10, minute, 0).unwrap(),
            "aheadofprint",
            "tester",
        )
    }

    #[test]
    fn processing_then_finished_replaces_in_place() {
        let tmp = TempDir::new().unwrap();
        let log = RunLog::open(tmp.path().join("runs")).unwrap();
        let mut record = RunRecord::begin(&stamp(0));
        log.save(&record).unwrap();
        assert_eq!(log.list(10).unwrap()[0].status, RunStatus::Processing);

        record.counts.new = 3;
        record.finish(None);
        log.save(&record).unwrap();

        let runs = log.list(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert_eq!(runs[0].counts.new, 3);
        assert!(log.record_path("20240201-100000").is_file());
    }

    #[test]
    fn broken_run_keeps_error_text() {
        let mut record = RunRecord::begin(&stamp(0));
        record.finish(Some(&SyncError::Cancelled));
        assert!(record.is_broken());
        assert_eq!(record.error.as_deref(), Some("run cancelled"));
    }

    #[test]
    fn same_second_runs_get_distinct_records() {
        let tmp = TempDir::new().unwrap();
        let log = RunLog::open(tmp.path()).unwrap();
        let mut first = log.begin(&stamp(0)).unwrap();
        first.finish(None);
        log.save(&first).unwrap();

        let second = log.begin(&stamp(0)).unwrap();
        let third = log.begin(&stamp(0)).unwrap();
        assert_eq!(first.run_id, "20240201-100000");
        assert_eq!(second.run_id, "20240201-100000_2");
        assert_eq!(third.run_id, "20240201-100000_3");

        let runs = log.list(10).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].run_id, "20240201-100000_3");
        let kept = runs.iter().find(|r| r.run_id == first.run_id).unwrap();
        assert_eq!(kept.status, RunStatus::Finished);
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let tmp = TempDir::new().unwrap();
        let log = RunLog::open(tmp.path()).unwrap();
        for minute in [5, 1, 9] {
            log.save(&RunRecord::begin(&stamp(minute))).unwrap();
        }
        std::fs::write(tmp.path().join("garbage.json"), b"{").unwrap();

        let ids: Vec<String> = log.list(2).unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["20240201-100900", "20240201-100500"]);
    }
}
