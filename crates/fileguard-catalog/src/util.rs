use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Row;

use fileguard_core::{CatalogRecord, ContentHash, FileStatus};

use super::CatalogError;

/// Column list matching [`RawRecord::from_row`].
pub(crate) const RECORD_COLUMNS: &str =
    "path, source, size, mtime, digest, first_seen, last_verified, status";

/// Translate rusqlite errors into friendlier CatalogError variants.
pub(crate) fn map_sql_error(err: rusqlite::Error) -> CatalogError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::DatabaseBusy =>
        {
            CatalogError::Busy
        }
        other => CatalogError::Sql(other),
    }
}

pub(crate) fn create_parent_if_needed(path: &Path) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|source| CatalogError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Stored form of a path.
pub(crate) fn path_text(path: &Path) -> Result<&str, CatalogError> {
    path.to_str()
        .ok_or_else(|| CatalogError::NonUtf8Path(path.to_path_buf()))
}

/// Escape LIKE wildcards so `input` matches literally (escape char `\`).
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(crate) fn to_secs(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

pub(crate) fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub(crate) fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// A `files` row before its text columns are validated.
pub(crate) struct RawRecord {
    path: String,
    source: String,
    size: i64,
    mtime: i64,
    digest: String,
    first_seen: i64,
    last_verified: i64,
    status: String,
}

impl RawRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            source: row.get(1)?,
            size: row.get(2)?,
            mtime: row.get(3)?,
            digest: row.get(4)?,
            first_seen: row.get(5)?,
            last_verified: row.get(6)?,
            status: row.get(7)?,
        })
    }
}

impl TryFrom<RawRecord> for CatalogRecord {
    type Error = CatalogError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let status: FileStatus = raw.status.parse().map_err(|_| CatalogError::InvalidStatus {
            path: raw.path.clone(),
            value: raw.status.clone(),
        })?;
        let digest = ContentHash::from_hex(&raw.digest).map_err(|err| CatalogError::InvalidDigest {
            path: raw.path.clone(),
            message: err.to_string(),
        })?;
        Ok(CatalogRecord {
            path: PathBuf::from(raw.path),
            source: raw.source.into(),
            size: raw.size.max(0) as u64,
            mtime: raw.mtime,
            digest,
            first_seen: from_secs(raw.first_seen),
            last_verified: from_secs(raw.last_verified),
            status,
        })
    }
}
