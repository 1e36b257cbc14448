use std::path::PathBuf;

use thiserror::Error;

use fileguard_core::DigestAlgorithm;

/// Errors returned by the catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// SQLite query failed.
    #[error("Catalog query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Database is locked by another process.
    #[error("Catalog database is busy, please retry")]
    Busy,
    /// Failed to create the directory holding the database.
    #[error("Could not create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A stored status value is not one of ok, corrupted, missing.
    #[error("Invalid status {value:?} stored for {path}")]
    InvalidStatus { path: String, value: String },
    /// A stored digest is not well-formed hex.
    #[error("Invalid digest stored for {path}: {message}")]
    InvalidDigest { path: String, message: String },
    /// The catalog was created with a different digest algorithm.
    #[error("Catalog uses {stored} digests, cannot open it with {requested}")]
    AlgorithmMismatch {
        stored: DigestAlgorithm,
        requested: DigestAlgorithm,
    },
    /// The catalog stores paths as text.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}
