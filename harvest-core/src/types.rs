//! Domain types for the harvest mirror.
//!
//! All types are serializable via serde; records are persisted as JSON lines by
//! the journal store and content records as one JSON document per identifier.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An opaque, strongly-typed identifier of a remote document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub String);

impl DocId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the identifier can be used verbatim as a file stem on any
    /// platform.
    ///
    /// Only ASCII letters, digits, `-`, `_` and `.` are allowed, and the id may
    /// not start or end with `.` (which also rules out `.` and `..`).
    pub fn is_file_safe(&self) -> bool {
        let id = self.0.as_str();
        !id.is_empty()
            && !id.starts_with('.')
            && !id.ends_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a tracked document.
///
/// Transitions: `∅ → Pending → Present → {Absent | Archived}`, and
/// `Absent → Pending` when an id reappears in a later listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    /// Fetch started but not confirmed; doubles as the crash-recovery marker.
    Pending,
    /// Content fetched, filed in the working directory and stored.
    Present,
    /// No longer part of the remote corpus; content retired.
    Absent,
    /// Finalized by the downstream archive; working file removed.
    Archived,
}

impl DocStatus {
    pub fn all() -> &'static [DocStatus] {
        &[
            DocStatus::Pending,
            DocStatus::Present,
            DocStatus::Absent,
            DocStatus::Archived,
        ]
    }

    /// `true` for states that need no fetch when the id is listed remotely.
    pub fn is_settled(self) -> bool {
        matches!(self, DocStatus::Present | DocStatus::Archived)
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocStatus::Pending => write!(f, "pending"),
            DocStatus::Present => write!(f, "present"),
            DocStatus::Absent => write!(f, "absent"),
            DocStatus::Archived => write!(f, "archived"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run attribution
// ---------------------------------------------------------------------------

/// Attribution shared by every transition made during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    pub started_at: DateTime<Utc>,
    pub process: String,
    pub owner: String,
}

impl RunStamp {
    /// Build a stamp; sub-second precision is dropped so that date/hour
    /// fields compare equal across serialization.
    pub fn new(started_at: DateTime<Utc>, process: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            started_at: started_at.trunc_subsecs(0),
            process: process.into(),
            owner: owner.into(),
        }
    }

    pub fn batch_date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    pub fn batch_hour(&self) -> NaiveTime {
        self.started_at.time()
    }

    /// `YYYYMMDD-HHMMSS` of the run start.
    pub fn run_id(&self) -> String {
        self.started_at.format("%Y%m%d-%H%M%S").to_string()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Per-identifier metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    pub status: DocStatus,
    pub batch_date: NaiveDate,
    pub batch_hour: NaiveTime,
    pub process: String,
    pub owner: String,
}

impl DocumentRecord {
    pub fn new(id: DocId, status: DocStatus, stamp: &RunStamp) -> Self {
        Self {
            id,
            status,
            batch_date: stamp.batch_date(),
            batch_hour: stamp.batch_hour(),
            process: stamp.process.clone(),
            owner: stamp.owner.clone(),
        }
    }

    /// Move to `status`, refreshing date/hour and attribution from `stamp`.
    pub fn restamp(&mut self, status: DocStatus, stamp: &RunStamp) {
        self.status = status;
        self.batch_date = stamp.batch_date();
        self.batch_hour = stamp.batch_hour();
        self.process = stamp.process.clone();
        self.owner = stamp.owner.clone();
    }
}

/// Stored content of a document, keyed by its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: DocId,
    /// Lowercase hex SHA-256 of `content`.
    pub sha256: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
