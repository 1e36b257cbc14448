//! Bounded-batch catalog writer.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use fileguard_catalog::{Catalog, CatalogError, CatalogRecord, CatalogWriteBatch};
use fileguard_core::{FileStatus, SourceLabel};

/// Single logical writer for a run.
///
/// Writes are grouped into transactions of at most `batch_size` records. A
/// failed write rolls back the whole open batch and is returned to the
/// caller; batches committed earlier stay durable. Dropping the writer
/// without [`BatchWriter::finish`] discards the open batch.
pub struct BatchWriter<'c> {
    catalog: &'c Catalog,
    batch: Option<CatalogWriteBatch<'c>>,
    batch_size: usize,
    committed: usize,
}

impl<'c> BatchWriter<'c> {
    pub fn new(catalog: &'c Catalog, batch_size: usize) -> Self {
        Self {
            catalog,
            batch: None,
            batch_size: batch_size.max(1),
            committed: 0,
        }
    }

    /// Insert or refresh a record.
    pub fn upsert(&mut self, record: &CatalogRecord) -> Result<(), CatalogError> {
        self.write(|batch| batch.upsert(record))
    }

    /// Set a record's status. Returns false if the path is not cataloged.
    pub fn update_status(
        &mut self,
        path: &Path,
        status: FileStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        self.write(|batch| batch.update_status(path, status, at))
    }

    /// Re-key a record to a new path.
    pub fn move_record(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        new_source: &SourceLabel,
        new_size: u64,
        new_mtime: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        self.write(|batch| batch.move_record(old_path, new_path, new_source, new_size, new_mtime, at))
    }

    /// Records committed so far.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Commit the open batch, if any.
    pub fn flush(&mut self) -> Result<(), CatalogError> {
        let Some(batch) = self.batch.take() else {
            return Ok(());
        };
        let count = batch.commit().inspect_err(|err| {
            error!("batch commit failed, batch rolled back: {err}");
        })?;
        self.committed += count;
        debug!(records = count, total = self.committed, "batch committed");
        Ok(())
    }

    /// Commit what is left and return the total number of committed writes.
    pub fn finish(mut self) -> Result<usize, CatalogError> {
        self.flush()?;
        Ok(self.committed)
    }

    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut CatalogWriteBatch<'c>) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let batch = match self.batch.as_mut() {
            Some(batch) => batch,
            None => self.batch.insert(self.catalog.write_batch()?),
        };

        let value = match op(batch) {
            Ok(value) => value,
            Err(err) => {
                if let Some(batch) = self.batch.take() {
                    let discarded = batch.pending();
                    if let Err(rollback) = batch.rollback() {
                        error!("rollback failed: {rollback}");
                    }
                    error!(discarded, "catalog write failed, batch rolled back: {err}");
                }
                return Err(err);
            }
        };

        if batch.pending() >= self.batch_size {
            self.flush()?;
        }
        Ok(value)
    }
}
