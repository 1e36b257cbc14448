use fileguard_catalog::{Catalog, CatalogError, FileStatus, OperationKind, OperationStatus};
use rusqlite::Connection;
use fileguard_core::{DigestAlgorithm, ScanConfig, SourceLabel, SourceSpec, VerifyConfig};
use fileguard_integrity::{IntegrityScanner, RunError, ScanOutcome, ScanSummary, Verifier, VerifyResult};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn catalog() -> Catalog {
    Catalog::open_in_memory(DigestAlgorithm::Sha256).unwrap()
}

fn scan(catalog: &Catalog, config: ScanConfig, root: &Path) -> ScanSummary {
    IntegrityScanner::new(catalog, config)
        .run(vec![SourceSpec::new("disk1", root).with_workers(2)])
        .unwrap()
}

fn verify(catalog: &Catalog, quick: bool) -> (fileguard_integrity::Summary, Vec<VerifyResult>) {
    let config = VerifyConfig::builder().quick(quick).workers(2usize).build().unwrap();
    let mut results = Vec::new();
    let summary = Verifier::new(catalog, config)
        .run_with(|r| results.push(r.clone()))
        .unwrap();
    (summary, results)
}

#[test]
fn test_first_scan_catalogs_every_file() {
    let disk = TempDir::new().unwrap();
    write(disk.path(), "a.txt", b"alpha");
    write(disk.path(), "sub/b.txt", b"beta");
    let catalog = catalog();

    let summary = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(summary.new, 2);
    assert_eq!(summary.written, 2);
    assert!(summary.is_clean());
    assert_eq!(catalog.count().unwrap(), 2);

    let record = catalog.get(&disk.path().join("a.txt")).unwrap().unwrap();
    assert_eq!(record.source, "disk1");
    assert_eq!(record.size, 5);
    assert_eq!(record.status, FileStatus::Ok);

    let history = catalog.history(0).unwrap();
    assert_eq!(history[0].kind, OperationKind::Scan);
    assert_eq!(history[0].status, OperationStatus::Completed);
    assert_eq!(history[0].scope, "disk1");
    assert_eq!(history[0].items_processed, 2);
}

#[test]
fn test_incremental_rescan_is_idempotent() {
    let disk = TempDir::new().unwrap();
    for i in 0..25 {
        write(disk.path(), &format!("d{}/f{i}.bin", i % 3), &[i as u8; 64]);
    }
    let catalog = catalog();

    let first = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(first.new, 25);

    let second = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(second.skipped, 25);
    assert_eq!(second.hashed, 0);
    assert_eq!(second.written, 0);
    assert_eq!(second.new + second.updated, 0);
    assert_eq!(catalog.count().unwrap(), 25);
}

#[test]
fn test_full_rescan_rehashes_unchanged_files() {
    let disk = TempDir::new().unwrap();
    write(disk.path(), "a.txt", b"alpha");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());

    let summary = scan(&catalog, ScanConfig::full(), disk.path());
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(catalog.count().unwrap(), 1);
}

#[test]
fn test_zero_byte_files_are_never_cataloged() {
    let disk = TempDir::new().unwrap();
    write(disk.path(), "empty.lock", b"");
    write(disk.path(), "data.bin", b"x");
    let catalog = catalog();

    scan(&catalog, ScanConfig::default(), disk.path());
    scan(&catalog, ScanConfig::full(), disk.path());
    assert_eq!(catalog.count().unwrap(), 1);
    assert!(catalog.get(&disk.path().join("empty.lock")).unwrap().is_none());
}

#[test]
fn test_move_is_detected_and_rekeyed() {
    let disk = TempDir::new().unwrap();
    let old = disk.path().join("movies/film.mkv");
    let new = disk.path().join("archive/2020/film.mkv");
    write(disk.path(), "movies/film.mkv", b"frames and frames");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());
    let original = catalog.get(&old).unwrap().unwrap();

    fs::remove_file(&old).unwrap();
    write(disk.path(), "archive/2020/film.mkv", b"frames and frames");

    let mut events = Vec::new();
    let summary = IntegrityScanner::new(&catalog, ScanConfig::default())
        .prepare(vec![SourceSpec::new("disk1", disk.path())])
        .unwrap()
        .run(|e| events.push(e.clone()))
        .unwrap();

    assert_eq!(summary.moved, 1);
    assert_eq!(summary.new, 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, ScanOutcome::Moved { from: old.clone() });

    assert_eq!(catalog.count().unwrap(), 1);
    assert!(catalog.get(&old).unwrap().is_none());
    let moved = catalog.get(&new).unwrap().unwrap();
    assert_eq!(moved.status, FileStatus::Ok);
    assert_eq!(moved.digest, original.digest);
    assert_eq!(moved.first_seen, original.first_seen);
}

#[test]
fn test_move_with_different_content_is_flagged() {
    let disk = TempDir::new().unwrap();
    let old = disk.path().join("a/photo.raw");
    let new = disk.path().join("b/photo.raw");
    write(disk.path(), "a/photo.raw", b"0123456789");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());

    fs::remove_file(&old).unwrap();
    write(disk.path(), "b/photo.raw", b"0123456780");

    let summary = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(summary.move_corrupted, 1);
    assert_eq!(summary.moved, 0);
    assert!(!summary.is_clean());

    let flagged = catalog.get(&new).unwrap().unwrap();
    assert_eq!(flagged.status, FileStatus::Corrupted);
    let stale = catalog.get(&old).unwrap().unwrap();
    assert_ne!(stale.digest, flagged.digest);

    // The stale origin is reported missing by the next verify.
    let (summary, _) = verify(&catalog, false);
    assert_eq!(summary.missing, 1);
    assert_eq!(catalog.get(&old).unwrap().unwrap().status, FileStatus::Missing);
}

#[test]
fn test_verify_detects_corruption() {
    let disk = TempDir::new().unwrap();
    let path = disk.path().join("doc.pdf");
    write(disk.path(), "doc.pdf", b"original content");
    write(disk.path(), "ok.txt", b"untouched");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());
    let stored = catalog.get(&path).unwrap().unwrap().digest;

    fs::write(&path, b"corrupted content").unwrap();

    let (summary, results) = verify(&catalog, false);
    assert_eq!(summary.total_checked, 2);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.corrupted, 1);
    assert!(!summary.is_clean());

    let bad = results.iter().find(|r| r.path == path).unwrap();
    assert_eq!(bad.status, FileStatus::Corrupted);
    assert_eq!(bad.old_digest, stored);
    assert!(bad.new_digest.is_some_and(|d| d != stored));

    let record = catalog.get(&path).unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Corrupted);
    assert_eq!(record.digest, stored);
    assert_eq!(catalog.history(1).unwrap()[0].kind, OperationKind::Verify);
}

#[test]
fn test_verify_reports_missing_without_hashing() {
    let disk = TempDir::new().unwrap();
    let path = disk.path().join("gone.bin");
    write(disk.path(), "gone.bin", b"soon deleted");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());
    let stored = catalog.get(&path).unwrap().unwrap().digest;

    fs::remove_file(&path).unwrap();

    let (summary, results) = verify(&catalog, false);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.total_checked, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, FileStatus::Missing);
    assert_eq!(results[0].old_digest, stored);
    assert!(results[0].new_digest.is_none());
    assert_eq!(catalog.get(&path).unwrap().unwrap().status, FileStatus::Missing);
}

#[test]
fn test_quick_verify_skips_unchanged_files() {
    let disk = TempDir::new().unwrap();
    let path = disk.path().join("stable.bin");
    write(disk.path(), "stable.bin", b"stable bytes");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());
    let before = catalog.get(&path).unwrap().unwrap();

    let (summary, results) = verify(&catalog, true);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.total_checked, 0);
    assert!(results.is_empty());
    assert!(summary.is_clean());
    assert_eq!(catalog.get(&path).unwrap().unwrap(), before);
}

#[test]
fn test_verify_scoped_to_one_source() {
    let disk1 = TempDir::new().unwrap();
    let disk2 = TempDir::new().unwrap();
    write(disk1.path(), "a.bin", b"a");
    write(disk2.path(), "b.bin", b"b");
    let catalog = catalog();
    IntegrityScanner::new(&catalog, ScanConfig::default())
        .run(vec![
            SourceSpec::new("disk1", disk1.path()),
            SourceSpec::new("disk2", disk2.path()),
        ])
        .unwrap();

    let config = VerifyConfig::builder().source(Some(SourceLabel::from("disk2"))).build().unwrap();
    let summary = Verifier::new(&catalog, config).run().unwrap();
    assert_eq!(summary.total_checked, 1);
    assert_eq!(catalog.history(1).unwrap()[0].scope, "disk2");
}

#[test]
fn test_unreadable_root_fails_only_its_source() {
    let good = TempDir::new().unwrap();
    write(good.path(), "keep.bin", b"keep");
    let missing_root = good.path().join("not-mounted");
    let catalog = catalog();

    let summary = IntegrityScanner::new(&catalog, ScanConfig::default())
        .run(vec![
            SourceSpec::new("good", good.path()),
            SourceSpec::new("offline", &missing_root),
        ])
        .unwrap();

    assert_eq!(summary.failed_sources, vec!["offline".to_string()]);
    assert!(!summary.is_clean());
    assert_eq!(summary.new, 1);
    assert_eq!(summary.sources.len(), 2);
    assert!(summary.sources.iter().any(|s| s.label == "offline" && s.error.is_some()));
}

#[test]
fn test_algorithm_mismatch_is_rejected() {
    let disk = TempDir::new().unwrap();
    write(disk.path(), "a.bin", b"a");
    let catalog = catalog();
    let config = ScanConfig::builder()
        .algorithm(DigestAlgorithm::Blake3)
        .build()
        .unwrap();

    let err = IntegrityScanner::new(&catalog, config)
        .run(vec![SourceSpec::new("disk1", disk.path())])
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Catalog(CatalogError::AlgorithmMismatch { .. })
    ));
    assert!(catalog.history(0).unwrap().is_empty());
}

#[test]
fn test_case_different_basename_is_not_a_move() {
    let disk = TempDir::new().unwrap();
    let old = disk.path().join("a/README.md");
    let new = disk.path().join("b/readme.md");
    write(disk.path(), "a/README.md", b"0123456789");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());

    fs::remove_file(&old).unwrap();
    write(disk.path(), "b/readme.md", b"abcdefghij");

    let summary = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(summary.new, 1);
    assert_eq!(summary.move_corrupted, 0);
    assert!(summary.is_clean());
    assert_eq!(catalog.get(&new).unwrap().unwrap().status, FileStatus::Ok);
    assert!(catalog.get(&old).unwrap().is_some());
}

#[test]
fn test_relative_root_is_cataloged_by_absolute_path() {
    let cwd = std::env::current_dir().unwrap();
    let disk = tempfile::Builder::new()
        .prefix(".scan-rel")
        .tempdir_in(&cwd)
        .unwrap();
    write(disk.path(), "f.bin", b"relative");
    let relative = disk.path().strip_prefix(&cwd).unwrap();
    let catalog = catalog();

    let summary = scan(&catalog, ScanConfig::default(), relative);
    assert_eq!(summary.new, 1);

    let records = catalog.all().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].path.is_absolute());
    assert_eq!(records[0].path, disk.path().canonicalize().unwrap().join("f.bin"));

    // A second run from the same relative root finds the same key.
    let again = scan(&catalog, ScanConfig::default(), relative);
    assert_eq!(again.skipped, 1);
    assert_eq!(catalog.count().unwrap(), 1);
}

#[test]
fn test_missing_file_is_revived_when_it_returns() {
    let disk = TempDir::new().unwrap();
    let away = TempDir::new().unwrap();
    let path = disk.path().join("photos/cat.jpg");
    write(disk.path(), "photos/cat.jpg", b"whiskers");
    let catalog = catalog();
    scan(&catalog, ScanConfig::default(), disk.path());
    let original = catalog.get(&path).unwrap().unwrap();

    let parked = away.path().join("cat.jpg");
    fs::rename(&path, &parked).unwrap();
    let (summary, _) = verify(&catalog, false);
    assert_eq!(summary.missing, 1);
    assert_eq!(catalog.get(&path).unwrap().unwrap().status, FileStatus::Missing);

    // Renaming back keeps the mtime, so only the missing status forces a rehash.
    fs::rename(&parked, &path).unwrap();
    let summary = scan(&catalog, ScanConfig::default(), disk.path());
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.unchanged, 1);

    let revived = catalog.get(&path).unwrap().unwrap();
    assert_eq!(revived.status, FileStatus::Ok);
    assert_eq!(revived.digest, original.digest);
    assert_eq!(revived.first_seen, original.first_seen);
    assert_eq!(catalog.count().unwrap(), 1);
}

#[test]
fn test_write_failure_keeps_committed_batches_and_fails_history() {
    let disk = TempDir::new().unwrap();
    for i in 0..10 {
        write(disk.path(), &format!("f{i}.bin"), format!("file {i}").as_bytes());
    }
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("catalog.db");
    let catalog = Catalog::open(&db, DigestAlgorithm::Sha256).unwrap();

    // Reject the sixth insert: batches of two commit four rows, and the
    // third batch already holds one row when it fails.
    Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER catalog_full BEFORE INSERT ON files
             WHEN (SELECT count(*) FROM files) >= 5
             BEGIN SELECT RAISE(ABORT, 'catalog full'); END;",
        )
        .unwrap();

    let config = ScanConfig::builder().batch_size(2usize).build().unwrap();
    let err = IntegrityScanner::new(&catalog, config)
        .run(vec![SourceSpec::new("disk1", disk.path()).with_workers(2)])
        .unwrap_err();

    assert!(matches!(err, RunError::Catalog(_)));
    assert_eq!(catalog.count().unwrap(), 4);
    let history = catalog.history(1).unwrap();
    assert_eq!(history[0].kind, OperationKind::Scan);
    assert_eq!(history[0].status, OperationStatus::Failed);
}
