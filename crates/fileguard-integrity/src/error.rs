use thiserror::Error;

use fileguard_catalog::CatalogError;
use fileguard_core::ScanError;

/// Errors that end a scan or verify run.
///
/// Per-file problems never surface here; they are counted in the run's
/// summary instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// The catalog could not be read or a batch could not be written.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Startup problem such as an invalid exclude pattern.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A pipeline thread died.
    #[error("Pipeline for {label} failed: {message}")]
    Pipeline { label: String, message: String },
}
