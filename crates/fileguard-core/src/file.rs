//! Transient pipeline items: descriptors in, digest results out.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use compact_str::CompactString;

use crate::error::ScanError;
use crate::hash::ContentHash;

/// Label naming a source (a disk, a cache pool, or an arbitrary root).
pub type SourceLabel = CompactString;

/// Size and modification time of a file, as compared by incremental modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Modification time in whole seconds since the Unix epoch.
    pub mtime: i64,
}

impl FileStat {
    /// Create a stat pair.
    pub fn new(size: u64, mtime: i64) -> Self {
        Self { size, mtime }
    }

    /// Extract size and mtime from filesystem metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            mtime: mtime_secs(metadata),
        }
    }
}

/// Modification time of `metadata` in whole seconds (negative before 1970).
fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    match metadata.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

/// A regular file discovered by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute path.
    pub path: PathBuf,
    /// Source the file was found on.
    pub source: SourceLabel,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in seconds.
    pub mtime: i64,
}

impl FileDescriptor {
    /// Create a descriptor.
    pub fn new(path: impl Into<PathBuf>, source: impl Into<SourceLabel>, stat: FileStat) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            size: stat.size,
            mtime: stat.mtime,
        }
    }

    /// Size and mtime of this descriptor.
    pub fn stat(&self) -> FileStat {
        FileStat::new(self.size, self.mtime)
    }
}

/// Input to the hashing pool.
///
/// When `stat` is present the worker reuses it instead of stat'ing the file
/// again; otherwise the result carries values read from the open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRequest {
    pub path: PathBuf,
    pub source: SourceLabel,
    pub stat: Option<FileStat>,
}

impl HashRequest {
    /// Request hashing of a path whose stat is not known yet.
    pub fn unstatted(path: impl Into<PathBuf>, source: impl Into<SourceLabel>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            stat: None,
        }
    }
}

impl From<FileDescriptor> for HashRequest {
    fn from(file: FileDescriptor) -> Self {
        let stat = Some(file.stat());
        Self {
            path: file.path,
            source: file.source,
            stat,
        }
    }
}

/// Output of the hashing pool: the file plus its digest or the failure.
#[derive(Debug)]
pub struct DigestResult {
    /// The hashed file. Size and mtime are zero when stat'ing failed.
    pub file: FileDescriptor,
    /// Digest of the file contents, or the error that prevented hashing.
    pub digest: Result<ContentHash, ScanError>,
}

impl DigestResult {
    /// Successful result.
    pub fn ok(file: FileDescriptor, digest: ContentHash) -> Self {
        Self {
            file,
            digest: Ok(digest),
        }
    }

    /// Failed result.
    pub fn failed(file: FileDescriptor, error: ScanError) -> Self {
        Self {
            file,
            digest: Err(error),
        }
    }

    /// Whether hashing failed.
    pub fn is_err(&self) -> bool {
        self.digest.is_err()
    }
}
