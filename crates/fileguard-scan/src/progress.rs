//! Scan progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Files between two progress broadcasts.
pub(crate) const PROGRESS_INTERVAL: u64 = 1000;

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Files produced by the walkers.
    pub files_walked: u64,
    /// Files whose digest has been computed (or failed).
    pub files_hashed: u64,
    /// Files dropped by the incremental filter.
    pub files_skipped: u64,
    /// Bytes of successfully hashed files.
    pub bytes_hashed: u64,
    /// Walk warnings and hashing failures.
    pub errors: u64,
    /// Most recent path seen.
    pub current_path: PathBuf,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_walked: 0,
            files_hashed: 0,
            files_skipped: 0,
            bytes_hashed: 0,
            errors: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Hashing rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_hashed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Hashing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_hashed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared counters updated by every pipeline thread.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_walked: AtomicU64,
    files_hashed: AtomicU64,
    files_skipped: AtomicU64,
    bytes_hashed: AtomicU64,
    errors: AtomicU64,
    tx: broadcast::Sender<ScanProgress>,
}

impl ProgressTracker {
    pub fn new(tx: broadcast::Sender<ScanProgress>) -> Self {
        Self {
            start_time: Instant::now(),
            files_walked: AtomicU64::new(0),
            files_hashed: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            tx,
        }
    }

    pub fn record_walked(&self) {
        self.files_walked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a hashing result and broadcast every [`PROGRESS_INTERVAL`] files.
    pub fn record_hashed(&self, path: &std::path::Path, size: Option<u64>) {
        if let Some(size) = size {
            self.bytes_hashed.fetch_add(size, Ordering::Relaxed);
        } else {
            self.record_error();
        }
        let count = self.files_hashed.fetch_add(1, Ordering::Relaxed);
        if count % PROGRESS_INTERVAL == 0 {
            let mut progress = self.snapshot();
            progress.current_path = path.to_path_buf();
            // No subscribers is fine.
            let _ = self.tx.send(progress);
        }
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            files_walked: self.files_walked.load(Ordering::Relaxed),
            files_hashed: self.files_hashed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            current_path: PathBuf::new(),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Broadcast the final totals.
    pub fn finish(&self) -> ScanProgress {
        let progress = self.snapshot();
        let _ = self.tx.send(progress.clone());
        progress
    }
}
