//! Scan and verify runs for fileguard.
//!
//! This crate joins the scan pipeline to the catalog:
//!
//! - [`IntegrityScanner`] drains the aggregate digest stream through a
//!   [`Reconciler`], which upserts known paths and detects moved files.
//! - [`Verifier`] re-hashes cataloged files and classifies each one as ok,
//!   corrupted or missing.
//!
//! Both write through a single [`BatchWriter`], so catalog changes land in
//! bounded transactions and a failed batch never half-applies.

mod error;
mod reconcile;
mod scan;
mod verify;
mod writer;

pub use error::RunError;
pub use reconcile::{Reconciler, ScanEvent, ScanOutcome};
pub use scan::{IntegrityScanner, PreparedScan, ScanSummary, SourceSummary};
pub use verify::{Summary, VerifyResult, Verifier};
pub use writer::BatchWriter;
