//! Source topology: which roots to scan and how hard to drive each one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::file::SourceLabel;

/// Storage medium behind a source.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Spinning disk; parallel reads thrash the head.
    #[strum(to_string = "rotational", serialize = "hdd")]
    Rotational,
    /// Flash storage; benefits from concurrent reads.
    #[strum(to_string = "ssd", serialize = "solidstate")]
    #[serde(alias = "ssd")]
    SolidState,
    #[default]
    Unknown,
}

impl MediaKind {
    /// Worker count recommended for this medium.
    pub fn default_workers(self) -> usize {
        WorkerPolicy::default().workers_for(self)
    }
}

/// Worker counts per medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPolicy {
    pub rotational: usize,
    pub solid_state: usize,
    pub unknown: usize,
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self {
            rotational: 1,
            solid_state: 4,
            unknown: 2,
        }
    }
}

impl WorkerPolicy {
    /// Worker count for `media`, never less than one.
    pub fn workers_for(&self, media: MediaKind) -> usize {
        let n = match media {
            MediaKind::Rotational => self.rotational,
            MediaKind::SolidState => self.solid_state,
            MediaKind::Unknown => self.unknown,
        };
        n.max(1)
    }
}

/// One independently scanned source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Label stored on every record found under this root.
    pub label: SourceLabel,
    /// Root directory to walk.
    pub root: PathBuf,
    /// Medium behind the root.
    #[serde(default)]
    pub media: MediaKind,
    /// Explicit worker count, overriding the medium policy.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl SourceSpec {
    /// Create a source with unknown media.
    pub fn new(label: impl Into<SourceLabel>, root: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            root: root.into(),
            media: MediaKind::Unknown,
            workers: None,
        }
    }

    /// Create a source labelled after the final component of its root.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.to_string_lossy().to_string());
        Self::new(label, root)
    }

    /// Set the medium.
    pub fn with_media(mut self, media: MediaKind) -> Self {
        self.media = media;
        self
    }

    /// Set an explicit worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Resolve the worker count for this source.
    pub fn worker_count(&self, policy: &WorkerPolicy) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => policy.workers_for(self.media),
        }
    }
}
