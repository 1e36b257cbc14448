use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use fileguard_core::{OperationKind, OperationStatus};

use super::util::{from_secs, map_sql_error};
use super::{Catalog, CatalogError};

/// Catalog-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_files: u64,
    pub total_bytes: u64,
    pub ok: u64,
    pub corrupted: u64,
    pub missing: u64,
    /// End of the last completed scan.
    pub last_scan: Option<DateTime<Utc>>,
    /// End of the last completed verify.
    pub last_verify: Option<DateTime<Utc>>,
}

/// Totals for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub total_files: u64,
    pub total_bytes: u64,
    pub corrupted: u64,
    pub missing: u64,
    pub last_verified: Option<DateTime<Utc>>,
}

impl Catalog {
    /// Totals over every record plus the last completed runs.
    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let (total_files, total_bytes, ok, corrupted, missing) = self
            .connection
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(size), 0),
                        COALESCE(SUM(CASE WHEN status = 'ok' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'corrupted' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'missing' THEN 1 ELSE 0 END), 0)
                 FROM files",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .map_err(map_sql_error)?;

        Ok(CatalogStats {
            total_files: total_files as u64,
            total_bytes: total_bytes as u64,
            ok: ok as u64,
            corrupted: corrupted as u64,
            missing: missing as u64,
            last_scan: self.last_completed(OperationKind::Scan)?,
            last_verify: self.last_completed(OperationKind::Verify)?,
        })
    }

    /// Per-source totals, ordered by source label.
    pub fn source_stats(&self) -> Result<Vec<SourceStats>, CatalogError> {
        let mut stmt = self
            .connection
            .prepare_cached(
                "SELECT source,
                        COUNT(*),
                        COALESCE(SUM(size), 0),
                        COALESCE(SUM(CASE WHEN status = 'corrupted' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'missing' THEN 1 ELSE 0 END), 0),
                        MAX(last_verified)
                 FROM files
                 GROUP BY source
                 ORDER BY source",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SourceStats {
                    source: row.get(0)?,
                    total_files: row.get::<_, i64>(1)? as u64,
                    total_bytes: row.get::<_, i64>(2)? as u64,
                    corrupted: row.get::<_, i64>(3)? as u64,
                    missing: row.get::<_, i64>(4)? as u64,
                    last_verified: row.get::<_, Option<i64>>(5)?.map(from_secs),
                })
            })
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }

    fn last_completed(&self, kind: OperationKind) -> Result<Option<DateTime<Utc>>, CatalogError> {
        let ended: Option<i64> = self
            .connection
            .query_row(
                "SELECT MAX(ended_at) FROM operation_history WHERE kind = ?1 AND status = ?2",
                params![kind.as_ref(), OperationStatus::Completed.as_ref()],
                |row| row.get(0),
            )
            .map_err(map_sql_error)?;
        Ok(ended.map(from_secs))
    }
}
