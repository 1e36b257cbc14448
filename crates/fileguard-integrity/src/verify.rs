//! Verify runs: re-hash cataloged files and classify them.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use fileguard_catalog::{Catalog, CatalogError, CatalogRecord, FileStatus, OperationKind};
use fileguard_core::{ContentHash, DigestResult, FileStat, HashRequest, SourceLabel, VerifyConfig};
use fileguard_scan::HashingPool;

use crate::error::RunError;
use crate::writer::BatchWriter;

const FEEDER_THREAD: &str = "verify-feed";

/// Classification of one verified file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub path: PathBuf,
    pub source: SourceLabel,
    pub status: FileStatus,
    /// Digest stored in the catalog before this run.
    pub old_digest: ContentHash,
    /// Digest computed now; absent for missing or unreadable files.
    pub new_digest: Option<ContentHash>,
    /// Read failure that caused a corrupted classification.
    pub error: Option<String>,
}

/// End-of-run totals for a verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Files classified ok, corrupted or missing. Skipped files are excluded.
    pub total_checked: u64,
    pub ok: u64,
    pub corrupted: u64,
    pub missing: u64,
    /// Files left alone by quick mode.
    pub skipped: u64,
    /// Files that could not be read.
    pub errors: u64,
    pub duration: Duration,
}

impl Summary {
    /// No corrupted or missing files were found.
    pub fn is_clean(&self) -> bool {
        self.corrupted == 0 && self.missing == 0
    }

    fn record(&mut self, result: &VerifyResult) {
        self.total_checked += 1;
        match result.status {
            FileStatus::Ok => self.ok += 1,
            FileStatus::Corrupted => self.corrupted += 1,
            FileStatus::Missing => self.missing += 1,
        }
        if result.error.is_some() {
            self.errors += 1;
        }
    }
}

/// What the feeder decided without hashing.
#[derive(Debug, Default)]
struct Triage {
    missing: Vec<PathBuf>,
    skipped: u64,
}

/// Re-hashes the catalog against the filesystem.
///
/// # Example
///
/// ```rust,no_run
/// use fileguard_catalog::Catalog;
/// use fileguard_core::{DigestAlgorithm, VerifyConfig};
/// use fileguard_integrity::Verifier;
///
/// let catalog = Catalog::open("/var/lib/fileguard/catalog.db", DigestAlgorithm::Sha256)?;
/// let config = VerifyConfig::builder().quick(true).build().unwrap();
/// let summary = Verifier::new(&catalog, config).run_with(|result| {
///     if result.status.is_problem() {
///         println!("{} {}", result.status, result.path.display());
///     }
/// })?;
/// std::process::exit(if summary.is_clean() { 0 } else { 2 });
/// # Ok::<(), fileguard_integrity::RunError>(())
/// ```
pub struct Verifier<'c> {
    catalog: &'c Catalog,
    config: VerifyConfig,
}

impl<'c> Verifier<'c> {
    pub fn new(catalog: &'c Catalog, config: VerifyConfig) -> Self {
        Self { catalog, config }
    }

    /// Verify every in-scope record.
    pub fn run(&self) -> Result<Summary, RunError> {
        self.run_with(|_| {})
    }

    /// Verify every in-scope record, calling `on_result` once per file
    /// classified ok, corrupted or missing.
    pub fn run_with(&self, mut on_result: impl FnMut(&VerifyResult)) -> Result<Summary, RunError> {
        let started = Instant::now();
        let stored = self.catalog.algorithm();
        if stored != self.config.algorithm {
            return Err(CatalogError::AlgorithmMismatch {
                stored,
                requested: self.config.algorithm,
            }
            .into());
        }

        let records = match &self.config.source {
            Some(label) => self.catalog.by_source(label)?,
            None => self.catalog.all()?,
        };
        let scope = self.config.source.as_deref().unwrap_or("all");
        let op = self.catalog.record_operation_start(OperationKind::Verify, scope)?;
        info!(scope, records = records.len(), quick = self.config.quick, "verify started");

        let mut summary = Summary::default();
        let outcome = self.verify_records(records, &mut summary, &mut on_result);
        summary.duration = started.elapsed();

        let items = summary.total_checked + summary.skipped;
        match outcome {
            Ok(written) => {
                self.catalog.record_operation_end(op, items, summary.errors)?;
                info!(
                    checked = summary.total_checked,
                    ok = summary.ok,
                    corrupted = summary.corrupted,
                    missing = summary.missing,
                    skipped = summary.skipped,
                    errors = summary.errors,
                    written,
                    elapsed = ?summary.duration,
                    "verify finished"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(history) = self.catalog.record_operation_failed(op, items, summary.errors + 1) {
                    error!("could not mark verify #{op} failed: {history}");
                }
                Err(err)
            }
        }
    }

    /// Returns the number of committed writes. The writer is gone by the
    /// time this returns, so history updates do not land in its batch.
    fn verify_records(
        &self,
        records: Vec<CatalogRecord>,
        summary: &mut Summary,
        on_result: &mut impl FnMut(&VerifyResult),
    ) -> Result<usize, RunError> {
        let workers = self.config.workers.max(1);
        let capacity = workers * 4;
        let (req_tx, req_rx) = bounded::<HashRequest>(capacity);
        let (res_tx, res_rx) = bounded::<DigestResult>(capacity);

        let requests: Vec<(PathBuf, SourceLabel, FileStat, FileStatus)> = records
            .iter()
            .map(|r| (r.path.clone(), r.source.clone(), r.stat(), r.status))
            .collect();
        let mut known: HashMap<PathBuf, CatalogRecord> =
            records.into_iter().map(|r| (r.path.clone(), r)).collect();

        let pool = HashingPool::new(workers, self.config.algorithm)
            .with_buffer_size(self.config.read_buffer_size)
            .with_name("verify")
            .spawn(req_rx, res_tx)?;
        let quick = self.config.quick;
        let feeder = thread::Builder::new()
            .name(FEEDER_THREAD.to_string())
            .spawn(move || feed(requests, quick, req_tx))
            .map_err(|_| pipeline_failure(FEEDER_THREAD, "could not start thread"))?;

        let mut writer = BatchWriter::new(self.catalog, self.config.batch_size);
        let hashed = classify_hashed(&res_rx, &mut known, &mut writer, summary, on_result);
        // Unblocks the pool and feeder if classification stopped early.
        drop(res_rx);

        let triage = join_feeder(feeder);
        let pool = pool.join();
        if let Err(err) = hashed {
            return Err(err.into());
        }
        let triage = triage?;
        pool.map_err(|err| pipeline_failure("verify", &err.to_string()))?;

        summary.skipped = triage.skipped;
        let now = Utc::now();
        for path in triage.missing {
            let Some(record) = known.remove(&path) else {
                continue;
            };
            warn!(path = %path.display(), "missing");
            writer.update_status(&path, FileStatus::Missing, now)?;
            let result = VerifyResult {
                path: record.path,
                source: record.source,
                status: FileStatus::Missing,
                old_digest: record.digest,
                new_digest: None,
                error: None,
            };
            summary.record(&result);
            on_result(&result);
        }

        Ok(writer.finish()?)
    }
}

/// Checks existence once per record and queues the files that need hashing.
fn feed(
    records: Vec<(PathBuf, SourceLabel, FileStat, FileStatus)>,
    quick: bool,
    requests: Sender<HashRequest>,
) -> Triage {
    let mut triage = Triage::default();
    for (path, source, stored, status) in records {
        let request = match fs::metadata(&path) {
            Ok(metadata) => {
                let live = FileStat::from_metadata(&metadata);
                if quick && status != FileStatus::Missing && live == stored {
                    triage.skipped += 1;
                    continue;
                }
                HashRequest {
                    path,
                    source,
                    stat: Some(live),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                triage.missing.push(path);
                continue;
            }
            // Let the pool report the failure on open.
            Err(_) => HashRequest::unstatted(path, source),
        };
        if requests.send(request).is_err() {
            debug!("verify queue closed, stopping feeder");
            break;
        }
    }
    triage
}

fn classify_hashed<'c>(
    results: &Receiver<DigestResult>,
    known: &mut HashMap<PathBuf, CatalogRecord>,
    writer: &mut BatchWriter<'c>,
    summary: &mut Summary,
    on_result: &mut impl FnMut(&VerifyResult),
) -> Result<(), CatalogError> {
    for result in results.iter() {
        let Some(record) = known.remove(&result.file.path) else {
            continue;
        };
        let verdict = match result.digest {
            Ok(digest) if digest == record.digest => VerifyResult {
                path: record.path,
                source: record.source,
                status: FileStatus::Ok,
                old_digest: record.digest,
                new_digest: Some(digest),
                error: None,
            },
            Ok(digest) => {
                warn!(
                    path = %record.path.display(),
                    old = %record.digest.short(),
                    new = %digest.short(),
                    "corrupted"
                );
                VerifyResult {
                    path: record.path,
                    source: record.source,
                    status: FileStatus::Corrupted,
                    old_digest: record.digest,
                    new_digest: Some(digest),
                    error: None,
                }
            }
            Err(err) => {
                warn!(path = %record.path.display(), "unreadable, marking corrupted: {err}");
                VerifyResult {
                    path: record.path,
                    source: record.source,
                    status: FileStatus::Corrupted,
                    old_digest: record.digest,
                    new_digest: None,
                    error: Some(err.to_string()),
                }
            }
        };
        writer.update_status(&verdict.path, verdict.status, Utc::now())?;
        summary.record(&verdict);
        on_result(&verdict);
    }
    Ok(())
}

fn join_feeder(feeder: JoinHandle<Triage>) -> Result<Triage, RunError> {
    feeder
        .join()
        .map_err(|_| pipeline_failure(FEEDER_THREAD, "thread panicked"))
}

fn pipeline_failure(label: &str, message: &str) -> RunError {
    RunError::Pipeline {
        label: label.to_string(),
        message: message.to_string(),
    }
}
