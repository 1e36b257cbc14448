use chrono::{TimeZone, Utc};
use fileguard_core::{
    CatalogRecord, ContentHash, DigestAlgorithm, FileDescriptor, FileStat, FileStatus,
    HashRequest, MediaKind, ScanConfig, SourceSpec, VerifyConfig,
};
use std::path::PathBuf;

#[test]
fn test_content_hash_creation_and_hex() {
    let bytes = [0xab; 32];
    let hash = ContentHash::new(bytes);

    let hex = hash.to_hex();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(hex.starts_with("ab"));

    let hash2 = ContentHash::new(bytes);
    assert_eq!(hash, hash2);

    let hash3 = ContentHash::new([0xcd; 32]);
    assert_ne!(hash, hash3);
}

#[test]
fn test_content_hash_serializes_as_hex() {
    let hash = ContentHash::new([0x01; 32]);
    let json = serde_json::to_string(&hash).unwrap();
    assert_eq!(json, format!("\"{}\"", "01".repeat(32)));

    let back: ContentHash = serde_json::from_str(&json).unwrap();
    assert_eq!(back, hash);
}

#[test]
fn test_descriptor_into_request_keeps_stat() {
    let file = FileDescriptor::new("/mnt/disk1/a.bin", "disk1", FileStat::new(42, 1_700_000_000));
    let request = HashRequest::from(file.clone());

    assert_eq!(request.path, file.path);
    assert_eq!(request.source, "disk1");
    assert_eq!(request.stat, Some(FileStat::new(42, 1_700_000_000)));

    let bare = HashRequest::unstatted("/mnt/disk1/a.bin", "disk1");
    assert!(bare.stat.is_none());
}

#[test]
fn test_catalog_record_basename() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let record = CatalogRecord {
        path: PathBuf::from("/mnt/disk1/movies/film.mkv"),
        source: "disk1".into(),
        size: 1024,
        mtime: 1_600_000_000,
        digest: ContentHash::new([0; 32]),
        first_seen: now,
        last_verified: now,
        status: FileStatus::Ok,
    };

    assert_eq!(record.basename(), Some("film.mkv"));
    assert_eq!(record.stat(), FileStat::new(1024, 1_600_000_000));
}

#[test]
fn test_record_serializes_status_lowercase() {
    let now = Utc.timestamp_opt(0, 0).unwrap();
    let record = CatalogRecord {
        path: PathBuf::from("/x"),
        source: "s".into(),
        size: 1,
        mtime: 0,
        digest: ContentHash::new([0; 32]),
        first_seen: now,
        last_verified: now,
        status: FileStatus::Corrupted,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["status"], "corrupted");
    assert_eq!(value["source"], "s");
}

#[test]
fn test_scan_config_defaults() {
    let config = ScanConfig::default();
    assert!(config.incremental);
    assert_eq!(config.batch_size, 1000);
    assert_eq!(config.move_candidate_limit, 20);
    assert_eq!(config.read_buffer_size, 1024 * 1024);
    assert_eq!(config.algorithm, DigestAlgorithm::Sha256);
    assert!(!ScanConfig::full().incremental);
}

#[test]
fn test_scan_config_from_partial_toml_like_json() {
    let config: ScanConfig = serde_json::from_str(r#"{"exclude_patterns": ["/tmp/"]}"#).unwrap();
    assert!(config.incremental);
    assert_eq!(config.batch_size, 1000);
    assert_eq!(config.worker_policy.solid_state, 4);
}

#[test]
fn test_verify_config_scope() {
    let config = VerifyConfig::builder()
        .source(Some("disk2".into()))
        .build()
        .unwrap();
    assert_eq!(config.source.as_deref(), Some("disk2"));
}

#[test]
fn test_source_spec_resolves_workers() {
    let config = ScanConfig::default();
    let ssd = SourceSpec::new("cache", "/mnt/cache").with_media(MediaKind::SolidState);
    let unknown = SourceSpec::from_root("/srv/data");

    assert_eq!(ssd.worker_count(&config.worker_policy), 4);
    assert_eq!(unknown.worker_count(&config.worker_policy), 2);
    assert_eq!(unknown.label, "data");
}
