//! Scan runs: pipeline results reconciled into the catalog.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

use fileguard_catalog::{Catalog, CatalogError, OperationKind};
use fileguard_core::{ScanConfig, ScanError, SourceSpec};
use fileguard_scan::{QuickSnapshot, RunningScan, ScanPipeline, ScanProgress, SourceReport};

use crate::error::RunError;
use crate::reconcile::{Reconciler, ScanEvent, ScanOutcome};
use crate::writer::BatchWriter;

/// Totals for one source of a scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub label: String,
    pub workers: usize,
    pub files_walked: u64,
    pub skipped: u64,
    pub warnings: usize,
    /// Why the source could not be scanned, if it failed as a whole.
    pub error: Option<String>,
}

impl From<&SourceReport> for SourceSummary {
    fn from(report: &SourceReport) -> Self {
        Self {
            label: report.label.to_string(),
            workers: report.workers,
            files_walked: report.files_walked,
            skipped: report.skipped,
            warnings: report.warnings.len(),
            error: report.error.as_ref().map(ToString::to_string),
        }
    }
}

/// End-of-run totals for a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Results reconciled, including hashing failures.
    pub hashed: u64,
    /// Files dropped by the incremental filter.
    pub skipped: u64,
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub moved: u64,
    pub move_corrupted: u64,
    /// Files that could not be hashed.
    pub errors: u64,
    /// Entries the walkers could not read.
    pub walk_errors: u64,
    /// Catalog writes committed.
    pub written: usize,
    pub duration: Duration,
    pub sources: Vec<SourceSummary>,
    /// Labels of sources whose root could not be walked.
    pub failed_sources: Vec<String>,
}

impl ScanSummary {
    /// No file was flagged as corrupted and every source root was walked.
    pub fn is_clean(&self) -> bool {
        self.move_corrupted == 0 && self.failed_sources.is_empty()
    }

    fn record(&mut self, outcome: &ScanOutcome) {
        self.hashed += 1;
        match outcome {
            ScanOutcome::New => self.new += 1,
            ScanOutcome::Updated => self.updated += 1,
            ScanOutcome::Unchanged => self.unchanged += 1,
            ScanOutcome::Moved { .. } => self.moved += 1,
            ScanOutcome::MoveCorrupted { .. } => self.move_corrupted += 1,
            ScanOutcome::Error { .. } => self.errors += 1,
        }
    }

    fn total_errors(&self) -> u64 {
        self.errors + self.walk_errors + self.failed_sources.len() as u64
    }
}

/// Runs scans against one catalog.
///
/// # Example
///
/// ```rust,no_run
/// use fileguard_catalog::Catalog;
/// use fileguard_core::{ScanConfig, SourceSpec};
/// use fileguard_integrity::IntegrityScanner;
///
/// let config = ScanConfig::default();
/// let catalog = Catalog::open("/var/lib/fileguard/catalog.db", config.algorithm)?;
/// let summary = IntegrityScanner::new(&catalog, config)
///     .run(vec![SourceSpec::from_root("/mnt/disk1")])?;
/// println!("{} new, {} moved", summary.new, summary.moved);
/// # Ok::<(), fileguard_integrity::RunError>(())
/// ```
pub struct IntegrityScanner<'c> {
    catalog: &'c Catalog,
    config: ScanConfig,
}

impl<'c> IntegrityScanner<'c> {
    pub fn new(catalog: &'c Catalog, config: ScanConfig) -> Self {
        Self { catalog, config }
    }

    /// Check the catalog, load its snapshot and build the pipeline without
    /// starting it.
    pub fn prepare(&self, sources: Vec<SourceSpec>) -> Result<PreparedScan<'c>, RunError> {
        let stored = self.catalog.algorithm();
        if stored != self.config.algorithm {
            return Err(CatalogError::AlgorithmMismatch {
                stored,
                requested: self.config.algorithm,
            }
            .into());
        }

        let scope = sources
            .iter()
            .map(|s| s.label.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let snapshot: QuickSnapshot = Arc::new(self.catalog.load_quick_lookup()?);
        let pipeline = ScanPipeline::new(&self.config, sources)?.with_snapshot(Arc::clone(&snapshot));

        Ok(PreparedScan {
            catalog: self.catalog,
            config: self.config.clone(),
            pipeline,
            snapshot,
            scope,
        })
    }

    /// Scan `sources` to completion.
    pub fn run(&self, sources: Vec<SourceSpec>) -> Result<ScanSummary, RunError> {
        self.prepare(sources)?.run(|_| {})
    }
}

/// A scan ready to start.
pub struct PreparedScan<'c> {
    catalog: &'c Catalog,
    config: ScanConfig,
    pipeline: ScanPipeline,
    snapshot: QuickSnapshot,
    scope: String,
}

impl<'c> PreparedScan<'c> {
    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.pipeline.subscribe()
    }

    /// Files known to the catalog when the scan was prepared.
    pub fn known_files(&self) -> usize {
        self.snapshot.len()
    }

    /// Run the scan, calling `on_event` once per reconciled file.
    ///
    /// A persistence failure rolls back the open batch and aborts the run;
    /// the history entry is then marked failed.
    pub fn run(self, mut on_event: impl FnMut(&ScanEvent)) -> Result<ScanSummary, RunError> {
        let started = Instant::now();
        let catalog = self.catalog;
        let op = catalog.record_operation_start(OperationKind::Scan, &self.scope)?;
        info!(
            scope = %self.scope,
            incremental = self.config.incremental,
            known = self.snapshot.len(),
            "scan started"
        );

        let running = match self.pipeline.start() {
            Ok(running) => running,
            Err(err) => {
                finalize_failed(catalog, op, 0, 1);
                return Err(err.into());
            }
        };

        let reconciler = Reconciler::new(catalog, self.snapshot, self.config.move_candidate_limit);
        let mut writer = BatchWriter::new(catalog, self.config.batch_size);
        let mut summary = ScanSummary::default();

        let drained = drain(&running, &reconciler, &mut writer, &mut summary, &mut on_event);
        let persisted = match drained {
            Ok(()) => writer.finish(),
            Err(err) => {
                drop(writer);
                Err(err)
            }
        };

        let report = running.finish();
        summary.skipped = report.progress.files_skipped;
        for source in &report.sources {
            summary.walk_errors += source.warnings.len() as u64;
            if source.failed() {
                summary.failed_sources.push(source.label.to_string());
            }
        }
        summary.sources = report.sources.iter().map(SourceSummary::from).collect();
        summary.duration = started.elapsed();

        let items = summary.hashed + summary.skipped;
        summary.written = match persisted {
            Ok(written) => written,
            Err(err) => {
                finalize_failed(catalog, op, items, summary.total_errors() + 1);
                return Err(err.into());
            }
        };

        if let Some(failure) = thread_failure(&report.sources) {
            finalize_failed(catalog, op, items, summary.total_errors());
            return Err(failure);
        }

        catalog.record_operation_end(op, items, summary.total_errors())?;
        info!(
            hashed = summary.hashed,
            skipped = summary.skipped,
            new = summary.new,
            updated = summary.updated,
            moved = summary.moved,
            move_corrupted = summary.move_corrupted,
            errors = summary.errors,
            written = summary.written,
            elapsed = ?summary.duration,
            "scan finished"
        );
        Ok(summary)
    }
}

fn drain<'c>(
    running: &RunningScan,
    reconciler: &Reconciler<'c>,
    writer: &mut BatchWriter<'c>,
    summary: &mut ScanSummary,
    on_event: &mut impl FnMut(&ScanEvent),
) -> Result<(), CatalogError> {
    for result in running.results().iter() {
        let event = reconciler.reconcile(result, writer, Utc::now())?;
        summary.record(&event.outcome);
        on_event(&event);
    }
    Ok(())
}

/// A crashed pipeline thread fails the whole run; an unreadable root does not.
fn thread_failure(sources: &[SourceReport]) -> Option<RunError> {
    sources.iter().find_map(|source| match &source.error {
        Some(err @ ScanError::ThreadFailed { .. }) => Some(RunError::Pipeline {
            label: source.label.to_string(),
            message: err.to_string(),
        }),
        _ => None,
    })
}

fn finalize_failed(catalog: &Catalog, op: i64, items: u64, errors: u64) {
    if let Err(err) = catalog.record_operation_failed(op, items, errors) {
        error!("could not mark scan #{op} failed: {err}");
    }
}
