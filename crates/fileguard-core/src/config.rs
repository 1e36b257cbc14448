//! Scan and verify configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::file::SourceLabel;
use crate::hash::DigestAlgorithm;
use crate::source::WorkerPolicy;

/// Records written per catalog transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Move candidates examined per new path.
pub const DEFAULT_MOVE_CANDIDATE_LIMIT: usize = 20;

/// Read buffer used while hashing (1 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration for a scan run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Regex patterns matched against full paths. Matching directories are
    /// pruned, matching files are skipped.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Skip hashing files whose size and mtime match the catalog.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Records per committed batch.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum move candidates examined per new path.
    #[builder(default = "DEFAULT_MOVE_CANDIDATE_LIMIT")]
    #[serde(default = "default_move_candidate_limit")]
    pub move_candidate_limit: usize,

    /// Queue slots per hashing worker between pipeline stages.
    #[builder(default = "4")]
    #[serde(default = "default_queue_depth")]
    pub queue_depth_per_worker: usize,

    /// Read buffer size for hashing.
    #[builder(default = "DEFAULT_READ_BUFFER_SIZE")]
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Worker counts per medium.
    #[builder(default)]
    #[serde(default)]
    pub worker_policy: WorkerPolicy,

    /// Digest algorithm.
    #[builder(default)]
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_move_candidate_limit() -> usize {
    DEFAULT_MOVE_CANDIDATE_LIMIT
}

fn default_queue_depth() -> usize {
    4
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.move_candidate_limit == Some(0) {
            return Err("Move candidate limit must be at least 1".to_string());
        }
        if self.read_buffer_size == Some(0) {
            return Err("Read buffer size must be at least 1 byte".to_string());
        }
        if self.queue_depth_per_worker == Some(0) {
            return Err("Queue depth must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Config for a full (non-incremental) scan.
    pub fn full() -> Self {
        Self {
            incremental: false,
            ..Self::default()
        }
    }

    /// Bounded queue capacity for a pipeline with `workers` hashing workers.
    pub fn queue_capacity(&self, workers: usize) -> usize {
        workers.max(1) * self.queue_depth_per_worker.max(1)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            incremental: true,
            batch_size: DEFAULT_BATCH_SIZE,
            move_candidate_limit: DEFAULT_MOVE_CANDIDATE_LIMIT,
            queue_depth_per_worker: 4,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            worker_policy: WorkerPolicy::default(),
            algorithm: DigestAlgorithm::default(),
        }
    }
}

/// Configuration for a verify run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct VerifyConfig {
    /// Skip re-hashing files whose size and mtime are unchanged.
    #[builder(default = "false")]
    #[serde(default)]
    pub quick: bool,

    /// Restrict verification to one source.
    #[builder(default)]
    #[serde(default)]
    pub source: Option<SourceLabel>,

    /// Hashing workers.
    #[builder(default = "4")]
    #[serde(default = "default_verify_workers")]
    pub workers: usize,

    /// Status updates per committed batch.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Read buffer size for hashing.
    #[builder(default = "DEFAULT_READ_BUFFER_SIZE")]
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Digest algorithm.
    #[builder(default)]
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
}

fn default_verify_workers() -> usize {
    4
}

impl VerifyConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Verify needs at least one worker".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.read_buffer_size == Some(0) {
            return Err("Read buffer size must be at least 1 byte".to_string());
        }
        Ok(())
    }
}

impl VerifyConfig {
    /// Create a new verify config builder.
    pub fn builder() -> VerifyConfigBuilder {
        VerifyConfigBuilder::default()
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            quick: false,
            source: None,
            workers: default_verify_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            algorithm: DigestAlgorithm::default(),
        }
    }
}
