use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{OptionalExtension, Params, params};

use fileguard_core::{CatalogRecord, ContentHash, FileStatus, QuickLookup};

use super::util::{RECORD_COLUMNS, RawRecord, escape_like, limit_param, map_sql_error, path_text};
use super::{Catalog, CatalogError, DEFAULT_SEARCH_LIMIT};

impl Catalog {
    /// Fetch the record at `path`, if any.
    pub fn get(&self, path: &Path) -> Result<Option<CatalogRecord>, CatalogError> {
        let path = path_text(path)?;
        let raw = self
            .connection
            .prepare_cached(&format!("SELECT {RECORD_COLUMNS} FROM files WHERE path = ?1"))
            .map_err(map_sql_error)?
            .query_row(params![path], RawRecord::from_row)
            .optional()
            .map_err(map_sql_error)?;
        raw.map(CatalogRecord::try_from).transpose()
    }

    /// Every record, ordered by path.
    pub fn all(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.query_records(&format!("SELECT {RECORD_COLUMNS} FROM files ORDER BY path"), [])
    }

    /// Records of one source, ordered by path.
    pub fn by_source(&self, source: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM files WHERE source = ?1 ORDER BY path"),
            params![source],
        )
    }

    /// Records with `status`, ordered by path.
    pub fn by_status(&self, status: FileStatus) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM files WHERE status = ?1 ORDER BY path"),
            params![status.as_ref()],
        )
    }

    /// Records whose path contains `needle` literally, ordered by path.
    ///
    /// A `limit` of zero uses [`DEFAULT_SEARCH_LIMIT`].
    pub fn search(&self, needle: &str, limit: usize) -> Result<Vec<CatalogRecord>, CatalogError> {
        let limit = if limit == 0 { DEFAULT_SEARCH_LIMIT } else { limit };
        let pattern = format!("%{}%", escape_like(needle));
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM files WHERE path LIKE ?1 ESCAPE '\\'
                 ORDER BY path LIMIT ?2"
            ),
            params![pattern, limit_param(limit)],
        )
    }

    /// Records that could be the origin of a moved file: same basename and
    /// size, most recently verified first.
    pub fn find_move_candidates(
        &self,
        basename: &str,
        size: u64,
        limit: usize,
    ) -> Result<Vec<CatalogRecord>, CatalogError> {
        // Exact suffix compare; LIKE folds ASCII case.
        let suffix = format!("/{basename}");
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM files
                 WHERE size = ?1 AND substr(path, -length(?2)) = ?2
                 ORDER BY last_verified DESC LIMIT ?3"
            ),
            params![size as i64, suffix, limit_param(limit)],
        )
    }

    /// Lightweight path → {size, mtime, digest, status} map of the whole catalog.
    pub fn load_quick_lookup(&self) -> Result<HashMap<PathBuf, QuickLookup>, CatalogError> {
        let mut stmt = self
            .connection
            .prepare("SELECT path, size, mtime, digest, status FROM files")
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(map_sql_error)?;

        let mut map = HashMap::new();
        for row in rows {
            let (path, size, mtime, digest, status) = row.map_err(map_sql_error)?;
            let digest = ContentHash::from_hex(&digest).map_err(|err| CatalogError::InvalidDigest {
                path: path.clone(),
                message: err.to_string(),
            })?;
            let status: FileStatus = status.parse().map_err(|_| CatalogError::InvalidStatus {
                path: path.clone(),
                value: status.clone(),
            })?;
            map.insert(
                PathBuf::from(path),
                QuickLookup {
                    size: size.max(0) as u64,
                    mtime,
                    digest,
                    status,
                },
            );
        }
        Ok(map)
    }

    /// Number of records.
    pub fn count(&self) -> Result<u64, CatalogError> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(map_sql_error)?;
        Ok(count as u64)
    }

    fn query_records<P: Params>(&self, sql: &str, params: P) -> Result<Vec<CatalogRecord>, CatalogError> {
        let mut stmt = self.connection.prepare_cached(sql).map_err(map_sql_error)?;
        let raws = stmt
            .query_map(params, RawRecord::from_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        raws.into_iter().map(CatalogRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fileguard_core::DigestAlgorithm;

    fn seed(catalog: &Catalog, rows: &[(&str, &str, u64, i64, FileStatus)]) {
        let mut batch = catalog.write_batch().unwrap();
        for (path, source, size, verified, status) in rows {
            let at = Utc.timestamp_opt(*verified, 0).unwrap();
            batch
                .upsert(&CatalogRecord {
                    path: PathBuf::from(path),
                    source: (*source).into(),
                    size: *size,
                    mtime: 50,
                    digest: ContentHash::new([*size as u8; 32]),
                    first_seen: at,
                    last_verified: at,
                    status: *status,
                })
                .unwrap();
        }
        batch.commit().unwrap();
    }

    fn paths(records: &[CatalogRecord]) -> Vec<String> {
        records.iter().map(|r| r.path.display().to_string()).collect()
    }

    #[test]
    fn move_candidates_match_basename_and_size() {
        let catalog = Catalog::open_in_memory(DigestAlgorithm::Sha256).unwrap();
        seed(
            &catalog,
            &[
                ("/d1/a/film.mkv", "d1", 10, 100, FileStatus::Ok),
                ("/d2/b/film.mkv", "d2", 10, 300, FileStatus::Ok),
                ("/d3/film.mkv", "d3", 11, 400, FileStatus::Ok),
                ("/d4/myfilm.mkv", "d4", 10, 500, FileStatus::Ok),
                ("/d5/film_mkv", "d5", 10, 600, FileStatus::Ok),
                ("/d6/FILM.mkv", "d6", 10, 700, FileStatus::Ok),
                ("/d7/Film.MKV", "d7", 10, 800, FileStatus::Ok),
            ],
        );

        let found = catalog.find_move_candidates("film.mkv", 10, 20).unwrap();
        assert_eq!(paths(&found), vec!["/d2/b/film.mkv", "/d1/a/film.mkv"]);

        let limited = catalog.find_move_candidates("film.mkv", 10, 1).unwrap();
        assert_eq!(paths(&limited), vec!["/d2/b/film.mkv"]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let catalog = Catalog::open_in_memory(DigestAlgorithm::Sha256).unwrap();
        seed(
            &catalog,
            &[
                ("/d/100%.txt", "d", 1, 1, FileStatus::Ok),
                ("/d/1000.txt", "d", 2, 1, FileStatus::Ok),
                ("/d/a_b", "d", 3, 1, FileStatus::Ok),
                ("/d/axb", "d", 4, 1, FileStatus::Ok),
            ],
        );
        assert_eq!(paths(&catalog.search("100%", 0).unwrap()), vec!["/d/100%.txt"]);
        assert_eq!(paths(&catalog.search("a_b", 0).unwrap()), vec!["/d/a_b"]);
        assert_eq!(catalog.search("/d/", 2).unwrap().len(), 2);
    }

    #[test]
    fn filters_by_source_and_status() {
        let catalog = Catalog::open_in_memory(DigestAlgorithm::Sha256).unwrap();
        seed(
            &catalog,
            &[
                ("/d1/a", "disk1", 1, 1, FileStatus::Ok),
                ("/d1/b", "disk1", 2, 1, FileStatus::Missing),
                ("/d2/c", "disk2", 3, 1, FileStatus::Corrupted),
            ],
        );
        assert_eq!(paths(&catalog.by_source("disk1").unwrap()), vec!["/d1/a", "/d1/b"]);
        assert_eq!(paths(&catalog.by_status(FileStatus::Corrupted).unwrap()), vec!["/d2/c"]);
        assert_eq!(catalog.count().unwrap(), 3);

        let lookup = catalog.load_quick_lookup().unwrap();
        assert_eq!(lookup.len(), 3);
        let b = lookup[&PathBuf::from("/d1/b")];
        assert_eq!(b.size, 2);
        assert_eq!(b.mtime, 50);
        assert_eq!(b.status, FileStatus::Missing);
    }
}
