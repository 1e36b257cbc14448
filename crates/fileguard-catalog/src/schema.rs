use rusqlite::{Connection, OptionalExtension, params};

use fileguard_core::DigestAlgorithm;

use super::CatalogError;
use super::util::map_sql_error;

/// Metadata key holding the digest algorithm the catalog was created with.
pub(crate) const META_ALGORITHM: &str = "digest_algorithm";

pub(super) fn apply_schema(connection: &Connection) -> Result<(), CatalogError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
             CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                digest TEXT NOT NULL,
                first_seen INTEGER NOT NULL,
                last_verified INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'ok'
                    CHECK (status IN ('ok', 'corrupted', 'missing'))
            );
             CREATE INDEX IF NOT EXISTS idx_files_source ON files (source);
             CREATE INDEX IF NOT EXISTS idx_files_status ON files (status);
             CREATE INDEX IF NOT EXISTS idx_files_digest ON files (digest);
             CREATE INDEX IF NOT EXISTS idx_files_size ON files (size);
             CREATE TABLE IF NOT EXISTS operation_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                scope TEXT NOT NULL DEFAULT '',
                items_processed INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'running'
             );
             CREATE INDEX IF NOT EXISTS idx_operation_history_started
                ON operation_history (started_at);",
        )
        .map_err(map_sql_error)
}

/// Record `algorithm` for a fresh catalog, or check it against the stored one.
pub(super) fn bind_algorithm(
    connection: &Connection,
    algorithm: DigestAlgorithm,
) -> Result<(), CatalogError> {
    let stored: Option<String> = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![META_ALGORITHM],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sql_error)?;

    match stored {
        None => {
            connection
                .execute(
                    "INSERT INTO metadata (key, value) VALUES (?1, ?2)",
                    params![META_ALGORITHM, algorithm.as_ref()],
                )
                .map_err(map_sql_error)?;
            Ok(())
        }
        Some(value) => match value.parse::<DigestAlgorithm>() {
            Ok(stored) if stored == algorithm => Ok(()),
            Ok(stored) => Err(CatalogError::AlgorithmMismatch {
                stored,
                requested: algorithm,
            }),
            Err(_) => Err(CatalogError::InvalidDigest {
                path: META_ALGORITHM.to_string(),
                message: format!("unknown digest algorithm {value:?}"),
            }),
        },
    }
}
