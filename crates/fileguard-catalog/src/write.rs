use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use fileguard_core::{CatalogRecord, FileStatus, SourceLabel};

use super::util::{map_sql_error, path_text, to_secs};
use super::{Catalog, CatalogError, CatalogWriteBatch};

impl Catalog {
    /// Start a write batch that wraps related mutations in a single transaction.
    pub fn write_batch(&self) -> Result<CatalogWriteBatch<'_>, CatalogError> {
        let tx = self
            .connection
            .unchecked_transaction()
            .map_err(map_sql_error)?;
        Ok(CatalogWriteBatch { tx, pending: 0 })
    }
}

impl<'conn> CatalogWriteBatch<'conn> {
    /// Insert a record or refresh the existing one at the same path.
    ///
    /// `first_seen` is kept from the existing row and `last_verified` never
    /// moves backwards.
    pub fn upsert(&mut self, record: &CatalogRecord) -> Result<(), CatalogError> {
        let path = path_text(&record.path)?;
        self.tx
            .prepare_cached(
                "INSERT INTO files (path, source, size, mtime, digest, first_seen, last_verified, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(path) DO UPDATE SET source = excluded.source,
                                                size = excluded.size,
                                                mtime = excluded.mtime,
                                                digest = excluded.digest,
                                                last_verified = MAX(last_verified, excluded.last_verified),
                                                status = excluded.status",
            )
            .map_err(map_sql_error)?
            .execute(params![
                path,
                record.source.as_str(),
                record.size as i64,
                record.mtime,
                record.digest.to_hex(),
                to_secs(record.first_seen),
                to_secs(record.last_verified),
                record.status.as_ref(),
            ])
            .map_err(map_sql_error)?;
        self.pending += 1;
        Ok(())
    }

    /// Set the status of the record at `path`. Returns false if no record exists.
    pub fn update_status(
        &mut self,
        path: &Path,
        status: FileStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        let path = path_text(path)?;
        let changed = self
            .tx
            .prepare_cached(
                "UPDATE files SET status = ?1, last_verified = MAX(last_verified, ?2)
                 WHERE path = ?3",
            )
            .map_err(map_sql_error)?
            .execute(params![status.as_ref(), to_secs(at), path])
            .map_err(map_sql_error)?;
        self.pending += 1;
        Ok(changed > 0)
    }

    /// Re-key the record at `old_path` to `new_path`, carrying its digest and
    /// `first_seen` forward and marking it ok.
    ///
    /// A record already sitting at `new_path` is removed first. Returns false
    /// and changes nothing if there is no record at `old_path`.
    pub fn move_record(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        new_source: &SourceLabel,
        new_size: u64,
        new_mtime: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        let old = path_text(old_path)?;
        let new = path_text(new_path)?;

        let exists = self
            .tx
            .prepare_cached("SELECT 1 FROM files WHERE path = ?1")
            .map_err(map_sql_error)?
            .query_row(params![old], |_| Ok(()))
            .optional()
            .map_err(map_sql_error)?
            .is_some();
        if !exists {
            return Ok(false);
        }

        if old != new {
            self.tx
                .prepare_cached("DELETE FROM files WHERE path = ?1")
                .map_err(map_sql_error)?
                .execute(params![new])
                .map_err(map_sql_error)?;
        }
        self.tx
            .prepare_cached(
                "UPDATE files
                 SET path = ?1, source = ?2, size = ?3, mtime = ?4,
                     last_verified = MAX(last_verified, ?5), status = 'ok'
                 WHERE path = ?6",
            )
            .map_err(map_sql_error)?
            .execute(params![
                new,
                new_source.as_str(),
                new_size as i64,
                new_mtime,
                to_secs(at),
                old
            ])
            .map_err(map_sql_error)?;
        self.pending += 1;
        Ok(true)
    }

    /// Writes issued since the batch started.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Commit all batched operations atomically. Returns the number of writes.
    pub fn commit(self) -> Result<usize, CatalogError> {
        let pending = self.pending;
        self.tx.commit().map_err(map_sql_error)?;
        Ok(pending)
    }

    /// Discard all batched operations.
    pub fn rollback(self) -> Result<(), CatalogError> {
        self.tx.rollback().map_err(map_sql_error)
    }
}
