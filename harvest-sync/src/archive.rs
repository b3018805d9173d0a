//! Archive pass: retire PRESENT documents that a downstream pipeline has
//! already finalized.
//!
//! Every regular file directly under the archive directory is read and passed
//! to a [`DedupeKeyExtractor`]. Each extracted id whose record is PRESENT has
//! its working file removed (best effort) and moves to ARCHIVED. The content
//! record is kept.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::bytes::Regex;
use serde::Serialize;

use harvest_core::{DocId, DocStatus, Mutation, RecordStore, RunStamp};

use crate::artifacts::ArtifactDir;
use crate::batch_writer::BatchWriter;
use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Pulls document ids out of an archived artifact.
pub trait DedupeKeyExtractor {
    /// Every id named by `artifact`; empty when it names none.
    fn extract(&self, artifact: &[u8]) -> Vec<DocId>;
}

/// Regex extractor: capture group 1 of each match, or the whole match when
/// the pattern has no groups.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    pattern: Regex,
}

impl PatternExtractor {
    pub fn new(pattern: &str) -> Result<Self, SyncError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl DedupeKeyExtractor for PatternExtractor {
    fn extract(&self, artifact: &[u8]) -> Vec<DocId> {
        self.pattern
            .captures_iter(artifact)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| DocId::from(String::from_utf8_lossy(m.as_bytes()).trim().to_string()))
            .filter(|id| !id.as_str().is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Relocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Archive files inspected.
    pub scanned: usize,
    /// Records moved from PRESENT to ARCHIVED.
    pub archived: usize,
    /// Artifacts that yielded no id or could not be read.
    pub skipped: Vec<PathBuf>,
}

pub struct ArchiveSync<'a> {
    records: &'a mut dyn RecordStore,
    artifacts: &'a ArtifactDir,
    stamp: RunStamp,
    write_buffer: usize,
}

impl<'a> ArchiveSync<'a> {
    pub fn new(
        records: &'a mut dyn RecordStore,
        artifacts: &'a ArtifactDir,
        stamp: RunStamp,
        write_buffer: usize,
    ) -> Self {
        Self {
            records,
            artifacts,
            stamp,
            write_buffer,
        }
    }

    /// Match `archive_dir` against the working set.
    pub fn relocate(
        self,
        archive_dir: &Path,
        extractor: &dyn DedupeKeyExtractor,
    ) -> Result<ArchiveSummary, SyncError> {
        let mut summary = ArchiveSummary::default();
        let mut finalized = BTreeSet::new();

        for path in archive_files(archive_dir)? {
            summary.scanned += 1;
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable archive artifact skipped");
                    summary.skipped.push(path);
                    continue;
                }
            };
            let ids = extractor.extract(&bytes);
            if ids.is_empty() {
                tracing::warn!(path = %path.display(), "no identifier in archive artifact");
                summary.skipped.push(path);
                continue;
            }
            finalized.extend(ids);
        }

        let present: BTreeSet<DocId> = self
            .records
            .ids_with_status(DocStatus::Present)?
            .into_iter()
            .collect();

        let mut writer = BatchWriter::new(self.records, self.write_buffer);
        for id in finalized.intersection(&present) {
            if let Err(err) = self.artifacts.remove(id) {
                tracing::warn!(id = %id, error = %err, "could not remove archived artifact");
            }
            writer.stage(Mutation::SetStatus {
                id: id.clone(),
                status: DocStatus::Archived,
                stamp: self.stamp.clone(),
            })?;
            summary.archived += 1;
        }
        writer.flush_remaining()?;

        tracing::info!(
            scanned = summary.scanned,
            archived = summary.archived,
            skipped = summary.skipped.len(),
            "archive pass done",
        );
        Ok(summary)
    }
}

/// Regular files directly under `dir`, sorted by name.
fn archive_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::medline_pmid(
        r"<PMID[^>]*>(\d+)</PMID>",
        "<PMID Version=\"1\">38000001</PMID>",
        &["38000001"]
    )]
    #[case::several(
        r"<PMID[^>]*>(\d+)</PMID>",
        "<PMID>1</PMID><x/><PMID Version=\"2\">2</PMID>",
        &["1", "2"]
    )]
    #[case::whole_match(r"\d{8}", "id=38000002;", &["38000002"])]
    #[case::nothing(r"<PMID[^>]*>(\d+)</PMID>", "<Article/>", &[])]
    fn pattern_extraction(#[case] pattern: &str, #[case] body: &str, #[case] expected: &[&str]) {
        let extractor = PatternExtractor::new(pattern).unwrap();
        let ids: Vec<String> = extractor
            .extract(body.as_bytes())
            .into_iter()
            .map(|id| id.0)
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(PatternExtractor::new("(unclosed"), Err(SyncError::Pattern(_))));
    }
}
