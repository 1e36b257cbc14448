//! SQLite-backed file integrity catalog for fileguard.
//!
//! The catalog holds one [`CatalogRecord`] per known path plus a log of scan
//! and verify runs. All mutations of file records go through a
//! [`CatalogWriteBatch`], which wraps one transaction: a batch either commits
//! as a unit or leaves the catalog untouched.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use chrono::Utc;
//! use fileguard_catalog::Catalog;
//! use fileguard_core::{DigestAlgorithm, FileStatus};
//!
//! let catalog = Catalog::open("/var/lib/fileguard/catalog.db", DigestAlgorithm::Sha256)?;
//!
//! let mut batch = catalog.write_batch()?;
//! batch.update_status(Path::new("/mnt/disk1/a.bin"), FileStatus::Missing, Utc::now())?;
//! batch.commit()?;
//!
//! for record in catalog.by_status(FileStatus::Missing)? {
//!     println!("{}", record.path.display());
//! }
//! # Ok::<(), fileguard_catalog::CatalogError>(())
//! ```

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};

use fileguard_core::DigestAlgorithm;

mod error;
mod history;
mod read;
mod schema;
mod stats;
mod util;
mod write;

pub use error::CatalogError;
pub use history::OperationEntry;
pub use stats::{CatalogStats, SourceStats};

pub use fileguard_core::{CatalogRecord, FileStatus, OperationKind, OperationStatus, QuickLookup};

/// Default number of rows returned by [`Catalog::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 100;
/// Default number of entries returned by [`Catalog::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Durable record store for one storage pool.
pub struct Catalog {
    connection: Connection,
    path: Option<PathBuf>,
    algorithm: DigestAlgorithm,
}

/// Groups catalog writes into one transaction using cached statements.
///
/// Dropping a batch without committing rolls it back.
pub struct CatalogWriteBatch<'conn> {
    tx: Transaction<'conn>,
    pending: usize,
}

impl Catalog {
    /// Open (or create) the catalog database at `path`.
    ///
    /// A new catalog is bound to `algorithm`; an existing catalog created
    /// with a different algorithm is rejected.
    pub fn open(path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path).map_err(util::map_sql_error)?;
        let catalog = Self {
            connection,
            path: Some(path.to_path_buf()),
            algorithm,
        };
        catalog.apply_pragmas()?;
        catalog.initialize()?;
        tracing::debug!(path = %path.display(), %algorithm, "catalog opened");
        Ok(catalog)
    }

    /// Open a private in-memory catalog.
    pub fn open_in_memory(algorithm: DigestAlgorithm) -> Result<Self, CatalogError> {
        let connection = Connection::open_in_memory().map_err(util::map_sql_error)?;
        let catalog = Self {
            connection,
            path: None,
            algorithm,
        };
        catalog.initialize()?;
        Ok(catalog)
    }

    /// Database file backing this catalog, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Digest algorithm all records were computed with.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    fn apply_pragmas(&self) -> Result<(), CatalogError> {
        self.connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;
             PRAGMA cache_size=-32000;",
            )
            .map_err(util::map_sql_error)
    }

    fn initialize(&self) -> Result<(), CatalogError> {
        schema::apply_schema(&self.connection)?;
        schema::bind_algorithm(&self.connection, self.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/catalog.db");
        let catalog = Catalog::open(&path, DigestAlgorithm::Sha256).unwrap();
        assert!(path.exists());
        assert_eq!(catalog.path(), Some(path.as_path()));
    }

    #[test]
    fn reopen_with_other_algorithm_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        drop(Catalog::open(&path, DigestAlgorithm::Sha256).unwrap());

        let err = Catalog::open(&path, DigestAlgorithm::Blake3).err().unwrap();
        assert!(matches!(
            err,
            CatalogError::AlgorithmMismatch {
                stored: DigestAlgorithm::Sha256,
                requested: DigestAlgorithm::Blake3
            }
        ));
        assert!(Catalog::open(&path, DigestAlgorithm::Sha256).is_ok());
    }

    #[test]
    fn in_memory_catalog_starts_empty() {
        let catalog = Catalog::open_in_memory(DigestAlgorithm::Blake3).unwrap();
        assert!(catalog.path().is_none());
        assert_eq!(catalog.algorithm(), DigestAlgorithm::Blake3);
        assert!(catalog.all().unwrap().is_empty());
    }
}
