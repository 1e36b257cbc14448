//! Digest results to catalog writes, with move detection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use fileguard_catalog::{Catalog, CatalogError, CatalogRecord, FileStatus};
use fileguard_core::{ContentHash, DigestResult, FileDescriptor, SourceLabel};
use fileguard_scan::QuickSnapshot;

use crate::writer::BatchWriter;

/// How one hashed file was reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Path not in the catalog and no move matched.
    New,
    /// Known path whose digest changed.
    Updated,
    /// Known path with the stored digest.
    Unchanged,
    /// Record re-keyed from a vanished path with identical content.
    Moved { from: PathBuf },
    /// Same basename and size as a vanished path, different content.
    MoveCorrupted { from: PathBuf },
    /// Hashing failed; nothing was written.
    Error { message: String },
}

/// Per-file result of a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    pub path: PathBuf,
    pub source: SourceLabel,
    pub digest: Option<ContentHash>,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// Applies scan results to the catalog.
///
/// Known paths are looked up in the snapshot taken when the run started;
/// move candidates are read from the live catalog so moves confirmed earlier
/// in the same run are respected.
pub struct Reconciler<'c> {
    catalog: &'c Catalog,
    snapshot: QuickSnapshot,
    move_candidate_limit: usize,
}

impl<'c> Reconciler<'c> {
    pub fn new(catalog: &'c Catalog, snapshot: QuickSnapshot, move_candidate_limit: usize) -> Self {
        Self {
            catalog,
            snapshot,
            move_candidate_limit: move_candidate_limit.max(1),
        }
    }

    /// Reconcile one result, writing through `writer`.
    ///
    /// Only persistence failures are returned as errors.
    pub fn reconcile(
        &self,
        result: DigestResult,
        writer: &mut BatchWriter<'c>,
        now: DateTime<Utc>,
    ) -> Result<ScanEvent, CatalogError> {
        let DigestResult { file, digest } = result;
        let digest = match digest {
            Ok(digest) => digest,
            Err(err) => {
                // The pool already warned about everything but vanished files.
                if err.is_not_found() {
                    warn!(source = %file.source, path = %file.path.display(), "vanished before hashing");
                } else {
                    debug!(path = %file.path.display(), "not cataloged: {err}");
                }
                return Ok(event(file, None, ScanOutcome::Error {
                    message: err.to_string(),
                }));
            }
        };

        if let Some(known) = self.snapshot.get(&file.path) {
            let outcome = if known.digest == digest {
                ScanOutcome::Unchanged
            } else {
                if known.matches(file.stat()) {
                    warn!(
                        path = %file.path.display(),
                        old = %known.digest.short(),
                        new = %digest.short(),
                        "content changed with size and mtime unchanged"
                    );
                }
                ScanOutcome::Updated
            };
            writer.upsert(&fresh_record(&file, digest, FileStatus::Ok, now))?;
            return Ok(event(file, Some(digest), outcome));
        }

        let outcome = self.detect_move(&file, digest, writer, now)?;
        Ok(event(file, Some(digest), outcome))
    }

    fn detect_move(
        &self,
        file: &FileDescriptor,
        digest: ContentHash,
        writer: &mut BatchWriter<'c>,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, CatalogError> {
        let Some(basename) = file.path.file_name().and_then(|n| n.to_str()) else {
            writer.upsert(&fresh_record(file, digest, FileStatus::Ok, now))?;
            return Ok(ScanOutcome::New);
        };

        let candidates =
            self.catalog
                .find_move_candidates(basename, file.size, self.move_candidate_limit)?;

        for candidate in candidates {
            if candidate.path == file.path || still_exists(&candidate.path) {
                continue;
            }

            if candidate.digest == digest {
                let moved = writer.move_record(
                    &candidate.path,
                    &file.path,
                    &file.source,
                    file.size,
                    file.mtime,
                    now,
                )?;
                if !moved {
                    continue;
                }
                info!(
                    from = %candidate.path.display(),
                    to = %file.path.display(),
                    "move detected"
                );
                return Ok(ScanOutcome::Moved {
                    from: candidate.path,
                });
            }

            warn!(
                old_path = %candidate.path.display(),
                new_path = %file.path.display(),
                size = file.size,
                old = %candidate.digest.short(),
                new = %digest.short(),
                "POSSIBLE CORRUPTION: file appears moved but content differs"
            );
            writer.upsert(&fresh_record(file, digest, FileStatus::Corrupted, now))?;
            return Ok(ScanOutcome::MoveCorrupted {
                from: candidate.path,
            });
        }

        writer.upsert(&fresh_record(file, digest, FileStatus::Ok, now))?;
        Ok(ScanOutcome::New)
    }
}

/// Whether `path` is still present. Anything but a clean not-found counts as
/// present, so an unreadable old path never triggers a move.
fn still_exists(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(err) => err.kind() != io::ErrorKind::NotFound,
    }
}

fn fresh_record(
    file: &FileDescriptor,
    digest: ContentHash,
    status: FileStatus,
    now: DateTime<Utc>,
) -> CatalogRecord {
    CatalogRecord {
        path: file.path.clone(),
        source: file.source.clone(),
        size: file.size,
        mtime: file.mtime,
        digest,
        first_seen: now,
        last_verified: now,
        status,
    }
}

fn event(file: FileDescriptor, digest: Option<ContentHash>, outcome: ScanOutcome) -> ScanEvent {
    ScanEvent {
        path: file.path,
        source: file.source,
        digest,
        outcome,
    }
}
