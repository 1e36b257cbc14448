//! Core types and configuration for fileguard.
//!
//! This crate provides the data structures shared by the scanning pipeline,
//! the catalog store and the integrity engine: file descriptors and digest
//! results flowing through the pipeline, catalog records and their status,
//! source topology, and run configuration.

mod config;
mod error;
mod file;
mod hash;
mod record;
mod source;

pub use config::{
    ScanConfig, ScanConfigBuilder, VerifyConfig, VerifyConfigBuilder, DEFAULT_BATCH_SIZE,
    DEFAULT_MOVE_CANDIDATE_LIMIT, DEFAULT_READ_BUFFER_SIZE,
};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use file::{DigestResult, FileDescriptor, FileStat, HashRequest, SourceLabel};
pub use hash::{ContentHash, DigestAlgorithm, ParseHashError};
pub use record::{CatalogRecord, FileStatus, OperationKind, OperationStatus, QuickLookup};
pub use source::{MediaKind, SourceSpec, WorkerPolicy};
