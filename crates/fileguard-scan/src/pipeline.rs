//! Per-source pipelines and the aggregate result stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use fileguard_core::{
    DigestResult, FileStatus, HashRequest, QuickLookup, ScanConfig, ScanError, ScanWarning,
    SourceLabel, SourceSpec,
};

use crate::exclude::ExcludeSet;
use crate::pool::{HashingPool, PoolHandle};
use crate::progress::{ProgressTracker, ScanProgress};
use crate::walker::{Walker, walk_threads_for};

/// Catalog view used by the incremental filter: path to stored size/mtime.
pub type QuickSnapshot = Arc<HashMap<PathBuf, QuickLookup>>;

/// What one source's walk produced.
#[derive(Debug, Default)]
pub struct SourceReport {
    /// Source label.
    pub label: SourceLabel,
    /// Hashing workers used.
    pub workers: usize,
    /// Regular non-empty files found.
    pub files_walked: u64,
    /// Files dropped by the incremental filter.
    pub skipped: u64,
    /// Entries that could not be read during the walk.
    pub warnings: Vec<ScanWarning>,
    /// Fatal error for this source, if its walk could not run.
    pub error: Option<ScanError>,
}

impl SourceReport {
    fn new(label: SourceLabel, workers: usize) -> Self {
        Self {
            label,
            workers,
            ..Self::default()
        }
    }

    /// Whether the source failed as a whole.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Totals for a finished scan.
#[derive(Debug)]
pub struct ScanReport {
    pub sources: Vec<SourceReport>,
    pub progress: ScanProgress,
}

/// Walker, hashing pool and optional incremental filter for one source.
#[derive(Debug, Clone)]
pub struct SourcePipeline {
    spec: SourceSpec,
    walker: Walker,
    pool: HashingPool,
    queue_capacity: usize,
    snapshot: Option<QuickSnapshot>,
}

impl SourcePipeline {
    /// Build the pipeline for `spec` using `config`'s policy and buffers.
    pub fn new(spec: SourceSpec, config: &ScanConfig, excludes: ExcludeSet) -> Self {
        let workers = spec.worker_count(&config.worker_policy);
        let walker = Walker::new(excludes).with_threads(walk_threads_for(workers));
        let pool = HashingPool::new(workers, config.algorithm)
            .with_buffer_size(config.read_buffer_size)
            .with_name(format!("hash-{}", spec.label));
        Self {
            queue_capacity: config.queue_capacity(workers),
            spec,
            walker,
            pool,
            snapshot: None,
        }
    }

    /// Drop files whose size and mtime match `snapshot`.
    pub fn with_filter(mut self, snapshot: QuickSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Source label.
    pub fn label(&self) -> &SourceLabel {
        &self.spec.label
    }

    /// Start walker, pool and forwarder threads. Every result is forwarded
    /// into `aggregate`.
    fn spawn(
        self,
        aggregate: Sender<DigestResult>,
        tracker: Arc<ProgressTracker>,
    ) -> Result<SourceTask, ScanError> {
        let label = self.spec.label.clone();
        let workers = self.pool.workers();
        info!(source = %label, root = %self.spec.root.display(), workers, "starting source");

        let (req_tx, req_rx) = bounded::<HashRequest>(self.queue_capacity);
        let (res_tx, res_rx) = bounded::<DigestResult>(self.queue_capacity);

        let pool = self.pool.spawn(req_rx, res_tx)?;

        let forwarder = {
            let tracker = Arc::clone(&tracker);
            let name = format!("fwd-{label}");
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || forward(res_rx, aggregate, &tracker))
                .map_err(|_| ScanError::ThreadFailed { name })?
        };

        let walker = {
            let name = format!("walk-{label}");
            let report = SourceReport::new(label.clone(), workers);
            let (spec, walker, snapshot) = (self.spec, self.walker, self.snapshot);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || walk_source(&walker, &spec, snapshot.as_deref(), req_tx, &tracker, report))
                .map_err(|_| ScanError::ThreadFailed { name })?
        };

        Ok(SourceTask {
            label,
            workers,
            walker,
            pool,
            forwarder,
        })
    }
}

struct SourceTask {
    label: SourceLabel,
    workers: usize,
    walker: JoinHandle<SourceReport>,
    pool: PoolHandle,
    forwarder: JoinHandle<()>,
}

impl SourceTask {
    fn join(self) -> SourceReport {
        let mut report = match self.walker.join() {
            Ok(report) => report,
            Err(_) => {
                let mut report = SourceReport::new(self.label.clone(), self.workers);
                report.error = Some(ScanError::ThreadFailed {
                    name: format!("walk-{}", self.label),
                });
                report
            }
        };
        if let Err(err) = self.pool.join() {
            report.error.get_or_insert(err);
        }
        if self.forwarder.join().is_err() {
            report.error.get_or_insert(ScanError::ThreadFailed {
                name: format!("fwd-{}", self.label),
            });
        }
        report
    }
}

fn walk_source(
    walker: &Walker,
    spec: &SourceSpec,
    snapshot: Option<&HashMap<PathBuf, QuickLookup>>,
    requests: Sender<HashRequest>,
    tracker: &ProgressTracker,
    mut report: SourceReport,
) -> SourceReport {
    let walk = match walker.walk(&spec.root, spec.label.clone()) {
        Ok(walk) => walk,
        Err(err) => {
            error!(source = %spec.label, root = %spec.root.display(), "cannot open source: {err}");
            report.error = Some(err);
            return report;
        }
    };

    for item in walk {
        let file = match item {
            Ok(file) => file,
            Err(warning) => {
                tracker.record_error();
                report.warnings.push(warning);
                continue;
            }
        };
        report.files_walked += 1;
        tracker.record_walked();

        if let Some(known) = snapshot.and_then(|s| s.get(&file.path))
            && known.status != FileStatus::Missing
            && known.matches(file.stat())
        {
            report.skipped += 1;
            tracker.record_skipped();
            continue;
        }

        if requests.send(HashRequest::from(file)).is_err() {
            debug!(source = %spec.label, "hash queue closed, stopping walk");
            break;
        }
    }

    debug!(
        source = %spec.label,
        walked = report.files_walked,
        skipped = report.skipped,
        warnings = report.warnings.len(),
        "walk finished"
    );
    report
}

fn forward(results: Receiver<DigestResult>, aggregate: Sender<DigestResult>, tracker: &ProgressTracker) {
    for result in results.iter() {
        let size = result.digest.as_ref().ok().map(|_| result.file.size);
        tracker.record_hashed(&result.file.path, size);
        if aggregate.send(result).is_err() {
            debug!("aggregate stream closed, forwarder exiting");
            break;
        }
    }
}

/// Concurrent scan over several sources, fanned into one result stream.
///
/// # Example
///
/// ```rust,no_run
/// use fileguard_core::{ScanConfig, SourceSpec};
/// use fileguard_scan::ScanPipeline;
///
/// let config = ScanConfig::default();
/// let sources = vec![SourceSpec::from_root("/mnt/disk1")];
/// let scan = ScanPipeline::new(&config, sources)?.start()?;
/// for result in scan.results() {
///     println!("{} {:?}", result.file.path.display(), result.digest);
/// }
/// let report = scan.finish();
/// # Ok::<(), fileguard_core::ScanError>(())
/// ```
pub struct ScanPipeline {
    config: ScanConfig,
    sources: Vec<SourceSpec>,
    excludes: ExcludeSet,
    snapshot: Option<QuickSnapshot>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl ScanPipeline {
    /// Prepare a scan. Fails if an exclusion pattern does not compile.
    pub fn new(config: &ScanConfig, sources: Vec<SourceSpec>) -> Result<Self, ScanError> {
        let excludes = ExcludeSet::new(&config.exclude_patterns)?;
        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self {
            config: config.clone(),
            sources,
            excludes,
            snapshot: None,
            progress_tx,
        })
    }

    /// Catalog snapshot for the incremental filter. Ignored unless the
    /// config is incremental.
    pub fn with_snapshot(mut self, snapshot: QuickSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Start every source concurrently.
    pub fn start(self) -> Result<RunningScan, ScanError> {
        let tracker = Arc::new(ProgressTracker::new(self.progress_tx));
        let filter = if self.config.incremental {
            self.snapshot
        } else {
            None
        };

        let pipelines: Vec<SourcePipeline> = self
            .sources
            .into_iter()
            .map(|spec| {
                let pipeline = SourcePipeline::new(spec, &self.config, self.excludes.clone());
                match &filter {
                    Some(snapshot) => pipeline.with_filter(Arc::clone(snapshot)),
                    None => pipeline,
                }
            })
            .collect();

        let capacity = pipelines
            .iter()
            .map(|p| p.queue_capacity)
            .sum::<usize>()
            .max(1);
        let (tx, rx) = bounded(capacity);

        let mut tasks = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            tasks.push(pipeline.spawn(tx.clone(), Arc::clone(&tracker))?);
        }
        // The aggregate closes once the last forwarder drops its sender.
        drop(tx);

        Ok(RunningScan {
            results: rx,
            tasks,
            tracker,
        })
    }
}

/// Handle to a scan in progress.
pub struct RunningScan {
    results: Receiver<DigestResult>,
    tasks: Vec<SourceTask>,
    tracker: Arc<ProgressTracker>,
}

impl RunningScan {
    /// Aggregate result stream. Iteration ends when every source has finished.
    pub fn results(&self) -> &Receiver<DigestResult> {
        &self.results
    }

    /// Current counters.
    pub fn progress(&self) -> ScanProgress {
        self.tracker.snapshot()
    }

    /// Stop consuming and wait for every source thread.
    ///
    /// Results not yet received are discarded; upstream threads unblock and
    /// exit once the aggregate receiver is gone.
    pub fn finish(self) -> ScanReport {
        drop(self.results);
        let sources = self.tasks.into_iter().map(SourceTask::join).collect();
        ScanReport {
            sources,
            progress: self.tracker.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileguard_core::{ContentHash, FileStat};
    use std::fs;
    use tempfile::TempDir;

    fn write_tree(root: &std::path::Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_aggregates_all_sources() {
        let disk1 = TempDir::new().unwrap();
        let disk2 = TempDir::new().unwrap();
        write_tree(disk1.path(), &[("a.txt", "a"), ("d/b.txt", "bb")]);
        write_tree(disk2.path(), &[("c.txt", "ccc"), ("empty", "")]);

        let sources = vec![
            SourceSpec::new("disk1", disk1.path()).with_workers(1),
            SourceSpec::new("disk2", disk2.path()).with_workers(3),
        ];
        let scan = ScanPipeline::new(&ScanConfig::default(), sources)
            .unwrap()
            .start()
            .unwrap();
        let results: Vec<DigestResult> = scan.results().iter().collect();
        let report = scan.finish();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.is_err()));
        assert_eq!(results.iter().filter(|r| r.file.source == "disk2").count(), 1);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[1].workers, 3);
        assert_eq!(report.progress.files_hashed, 3);
    }

    #[test]
    fn test_bad_root_fails_only_its_source() {
        let good = TempDir::new().unwrap();
        write_tree(good.path(), &[("a.txt", "a")]);

        let sources = vec![
            SourceSpec::new("gone", good.path().join("missing")),
            SourceSpec::new("good", good.path()),
        ];
        let scan = ScanPipeline::new(&ScanConfig::default(), sources)
            .unwrap()
            .start()
            .unwrap();
        let results: Vec<DigestResult> = scan.results().iter().collect();
        let report = scan.finish();

        assert_eq!(results.len(), 1);
        assert!(report.sources[0].failed());
        assert!(!report.sources[1].failed());
    }

    #[test]
    fn test_incremental_filter_skips_unchanged() {
        let disk = TempDir::new().unwrap();
        write_tree(disk.path(), &[("same.txt", "same"), ("changed.txt", "new"), ("gone.txt", "x")]);

        let stat = |name: &str| {
            FileStat::from_metadata(&fs::metadata(disk.path().join(name)).unwrap())
        };
        let lookup = |stat: FileStat, status| QuickLookup {
            size: stat.size,
            mtime: stat.mtime,
            digest: ContentHash::new([0; 32]),
            status,
        };
        let mut map = HashMap::new();
        map.insert(disk.path().join("same.txt"), lookup(stat("same.txt"), FileStatus::Ok));
        map.insert(
            disk.path().join("changed.txt"),
            lookup(FileStat::new(999, 0), FileStatus::Ok),
        );
        map.insert(disk.path().join("gone.txt"), lookup(stat("gone.txt"), FileStatus::Missing));

        let scan = ScanPipeline::new(&ScanConfig::default(), vec![SourceSpec::new("d", disk.path())])
            .unwrap()
            .with_snapshot(Arc::new(map.clone()))
            .start()
            .unwrap();
        let mut hashed: Vec<String> = scan
            .results()
            .iter()
            .map(|r| r.file.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        hashed.sort();
        let report = scan.finish();
        assert_eq!(hashed, vec!["changed.txt", "gone.txt"]);
        assert_eq!(report.sources[0].skipped, 1);

        let full = ScanPipeline::new(&ScanConfig::full(), vec![SourceSpec::new("d", disk.path())])
            .unwrap()
            .with_snapshot(Arc::new(map))
            .start()
            .unwrap();
        assert_eq!(full.results().iter().count(), 3);
        full.finish();
    }

    #[test]
    fn test_early_finish_does_not_hang() {
        let disk = TempDir::new().unwrap();
        for i in 0..200 {
            fs::write(disk.path().join(format!("{i}.bin")), format!("{i}")).unwrap();
        }
        let config = ScanConfig::builder().queue_depth_per_worker(1usize).build().unwrap();
        let scan = ScanPipeline::new(&config, vec![SourceSpec::new("d", disk.path()).with_workers(1)])
            .unwrap()
            .start()
            .unwrap();
        let _first = scan.results().recv().unwrap();
        let report = scan.finish();
        assert!(report.sources[0].files_walked >= 1);
    }

    #[test]
    fn test_invalid_exclude_is_startup_error() {
        let config = ScanConfig::builder()
            .exclude_patterns(vec!["[".to_string()])
            .build()
            .unwrap();
        assert!(matches!(
            ScanPipeline::new(&config, Vec::new()),
            Err(ScanError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_progress_subscription() {
        let disk = TempDir::new().unwrap();
        write_tree(disk.path(), &[("a.txt", "a")]);
        let pipeline =
            ScanPipeline::new(&ScanConfig::default(), vec![SourceSpec::new("d", disk.path())])
                .unwrap();
        let mut rx = pipeline.subscribe();
        let scan = pipeline.start().unwrap();
        for _ in scan.results().iter() {}
        scan.finish();
        let mut last = None;
        while let Ok(progress) = rx.try_recv() {
            last = Some(progress);
        }
        assert_eq!(last.unwrap().files_hashed, 1);
    }
}
