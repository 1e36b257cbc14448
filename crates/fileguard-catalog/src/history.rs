use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use fileguard_core::{OperationKind, OperationStatus};

use super::util::{from_secs, limit_param, map_sql_error, to_secs};
use super::{Catalog, CatalogError, DEFAULT_HISTORY_LIMIT};

/// One logged scan or verify run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationEntry {
    pub id: i64,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Sources or roots the run covered.
    pub scope: String,
    pub items_processed: u64,
    pub errors: u64,
    pub status: OperationStatus,
}

impl Catalog {
    /// Log the start of a run. Returns the entry id.
    pub fn record_operation_start(
        &self,
        kind: OperationKind,
        scope: &str,
    ) -> Result<i64, CatalogError> {
        self.connection
            .prepare_cached(
                "INSERT INTO operation_history (kind, started_at, scope, status)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(map_sql_error)?
            .execute(params![
                kind.as_ref(),
                to_secs(Utc::now()),
                scope,
                OperationStatus::Running.as_ref()
            ])
            .map_err(map_sql_error)?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Mark a running entry completed.
    pub fn record_operation_end(
        &self,
        id: i64,
        items_processed: u64,
        errors: u64,
    ) -> Result<(), CatalogError> {
        self.finish_operation(id, items_processed, errors, OperationStatus::Completed)
    }

    /// Mark a running entry failed.
    pub fn record_operation_failed(
        &self,
        id: i64,
        items_processed: u64,
        errors: u64,
    ) -> Result<(), CatalogError> {
        self.finish_operation(id, items_processed, errors, OperationStatus::Failed)
    }

    // Finished entries are immutable, so only a running row is touched.
    fn finish_operation(
        &self,
        id: i64,
        items_processed: u64,
        errors: u64,
        status: OperationStatus,
    ) -> Result<(), CatalogError> {
        self.connection
            .prepare_cached(
                "UPDATE operation_history
                 SET ended_at = ?1, items_processed = ?2, errors = ?3, status = ?4
                 WHERE id = ?5 AND status = 'running'",
            )
            .map_err(map_sql_error)?
            .execute(params![
                to_secs(Utc::now()),
                items_processed as i64,
                errors as i64,
                status.as_ref(),
                id
            ])
            .map_err(map_sql_error)?;
        Ok(())
    }

    /// Most recent runs first. A `limit` of zero uses [`DEFAULT_HISTORY_LIMIT`].
    pub fn history(&self, limit: usize) -> Result<Vec<OperationEntry>, CatalogError> {
        let limit = if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit };
        let mut stmt = self
            .connection
            .prepare_cached(
                "SELECT id, kind, started_at, ended_at, scope, items_processed, errors, status
                 FROM operation_history
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?1",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![limit_param(limit)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;

        rows.into_iter()
            .map(|(id, kind, started, ended, scope, items, errors, status)| -> Result<OperationEntry, CatalogError> {
                let invalid = |value: &str| CatalogError::InvalidStatus {
                    path: format!("operation #{id}"),
                    value: value.to_string(),
                };
                Ok(OperationEntry {
                    id,
                    kind: kind.parse().map_err(|_| invalid(&kind))?,
                    started_at: from_secs(started),
                    ended_at: ended.map(from_secs),
                    scope,
                    items_processed: items.max(0) as u64,
                    errors: errors.max(0) as u64,
                    status: status.parse().map_err(|_| invalid(&status))?,
                })
            })
            .collect()
    }
}
