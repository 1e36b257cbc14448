//! Persistent catalog entities.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::file::{FileStat, SourceLabel};
use crate::hash::ContentHash;

/// Integrity status of a cataloged file.
///
/// Transitions are driven only by scan and verify outcomes:
/// scan writes `Ok` (or `Corrupted` for a suspected damaged move),
/// verify writes `Ok`, `Corrupted` or `Missing`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Corrupted,
    Missing,
}

impl FileStatus {
    /// Whether this status should be flagged to an operator.
    pub fn is_problem(self) -> bool {
        !matches!(self, FileStatus::Ok)
    }
}

/// One cataloged file, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub path: PathBuf,
    pub source: SourceLabel,
    pub size: u64,
    pub mtime: i64,
    pub digest: ContentHash,
    /// Set on creation and never changed afterwards, including across moves.
    pub first_seen: DateTime<Utc>,
    /// Never moves backwards.
    pub last_verified: DateTime<Utc>,
    pub status: FileStatus,
}

impl CatalogRecord {
    /// Size and mtime as stored.
    pub fn stat(&self) -> FileStat {
        FileStat::new(self.size, self.mtime)
    }

    /// Final path component, used for move detection.
    pub fn basename(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Lightweight per-path snapshot used for incremental comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickLookup {
    pub size: u64,
    pub mtime: i64,
    pub digest: ContentHash,
    pub status: FileStatus,
}

impl QuickLookup {
    /// Whether the stored size and mtime equal `stat`.
    pub fn matches(&self, stat: FileStat) -> bool {
        self.size == stat.size && self.mtime == stat.mtime
    }
}

/// Kind of recorded operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Scan,
    Verify,
}

/// Lifecycle of an operation history entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
}
