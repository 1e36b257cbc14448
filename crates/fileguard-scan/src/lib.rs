//! Walking and hashing pipeline for fileguard.
//!
//! This crate turns a list of sources into one stream of content digests.
//!
//! # Overview
//!
//! Each source gets its own pipeline:
//!
//! - **Walker** enumerates regular, non-empty files via jwalk, pruning
//!   excluded directories before descending
//! - **Incremental filter** drops files whose size and mtime match the catalog
//! - **Hashing pool** of N worker threads sharing one bounded queue
//!
//! All pipelines run concurrently. A forwarder per source fans results into
//! one aggregate stream, which closes once every source has finished.
//!
//! # Example
//!
//! ```rust,no_run
//! use fileguard_core::{MediaKind, ScanConfig, SourceSpec};
//! use fileguard_scan::ScanPipeline;
//!
//! let config = ScanConfig::default();
//! let sources = vec![
//!     SourceSpec::new("disk1", "/mnt/disk1").with_media(MediaKind::Rotational),
//!     SourceSpec::new("cache", "/mnt/cache").with_media(MediaKind::SolidState),
//! ];
//!
//! let pipeline = ScanPipeline::new(&config, sources)?;
//! let mut progress_rx = pipeline.subscribe();
//! let scan = pipeline.start()?;
//!
//! for result in scan.results() {
//!     match &result.digest {
//!         Ok(digest) => println!("{digest}  {}", result.file.path.display()),
//!         Err(err) => eprintln!("{err}"),
//!     }
//! }
//!
//! let report = scan.finish();
//! println!("hashed {} files", report.progress.files_hashed);
//! # let _ = progress_rx.try_recv();
//! # Ok::<(), fileguard_core::ScanError>(())
//! ```

mod digest;
mod exclude;
mod pipeline;
mod pool;
mod progress;
mod walker;

pub use digest::{hash_bytes, hash_file, hash_reader};
pub use exclude::ExcludeSet;
pub use pipeline::{
    QuickSnapshot, RunningScan, ScanPipeline, ScanReport, SourcePipeline, SourceReport,
};
pub use pool::{HashingPool, PoolHandle};
pub use progress::ScanProgress;
pub use walker::{Walk, Walker};

// Re-export core types for convenience
pub use fileguard_core::{
    DigestAlgorithm, DigestResult, FileDescriptor, HashRequest, ScanConfig, ScanError,
    ScanWarning, SourceSpec, WarningKind,
};
