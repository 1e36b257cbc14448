use fileguard_core::{DigestAlgorithm, ScanConfig, SourceSpec};
use fileguard_scan::{DigestResult, ScanPipeline, hash_bytes};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn collect(config: &ScanConfig, sources: Vec<SourceSpec>) -> Vec<DigestResult> {
    let scan = ScanPipeline::new(config, sources).unwrap().start().unwrap();
    let results = scan.results().iter().collect();
    scan.finish();
    results
}

#[test]
fn test_hello_world_digest() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("hello.txt"), "hello world\n").unwrap();

    let results = collect(&ScanConfig::default(), vec![SourceSpec::new("t", temp.path())]);
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].digest.as_ref().unwrap().to_hex(),
        "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
    );
    assert_eq!(results[0].file.size, 12);
}

#[test]
fn test_digest_independent_of_worker_count() {
    let temp = TempDir::new().unwrap();
    for i in 0..40 {
        fs::write(temp.path().join(format!("{i}.dat")), vec![i as u8; 1000 + i]).unwrap();
    }

    let digests = |workers: usize| -> HashMap<PathBuf, String> {
        collect(
            &ScanConfig::default(),
            vec![SourceSpec::new("t", temp.path()).with_workers(workers)],
        )
        .into_iter()
        .map(|r| (r.file.path, r.digest.unwrap().to_hex()))
        .collect()
    };

    let serial = digests(1);
    let parallel = digests(6);
    assert_eq!(serial.len(), 40);
    assert_eq!(serial, parallel);
}

#[test]
fn test_blake3_pipeline() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("x.bin"), b"payload").unwrap();

    let config = ScanConfig::builder()
        .algorithm(DigestAlgorithm::Blake3)
        .build()
        .unwrap();
    let results = collect(&config, vec![SourceSpec::new("t", temp.path())]);
    assert_eq!(
        *results[0].digest.as_ref().unwrap(),
        hash_bytes(b"payload", DigestAlgorithm::Blake3)
    );
}

#[test]
fn test_exclusions_and_empty_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join(".Recycle.Bin/deep")).unwrap();
    fs::create_dir_all(root.join("media")).unwrap();
    fs::write(root.join(".Recycle.Bin/deep/old.iso"), "old").unwrap();
    fs::write(root.join("media/film.mkv"), "film").unwrap();
    fs::write(root.join("media/film.mkv.partial"), "part").unwrap();
    fs::write(root.join("media/.lock"), "").unwrap();

    let config = ScanConfig::builder()
        .exclude_patterns(vec![
            r"/\.Recycle\.Bin$".to_string(),
            r"\.partial$".to_string(),
        ])
        .build()
        .unwrap();
    let results = collect(&config, vec![SourceSpec::new("t", root)]);

    let names: Vec<String> = results
        .iter()
        .map(|r| r.file.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["film.mkv"]);
}

#[test]
fn test_sources_keep_their_labels() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    fs::write(a.path().join("one"), "1").unwrap();
    fs::write(b.path().join("two"), "2").unwrap();

    let results = collect(
        &ScanConfig::default(),
        vec![SourceSpec::new("disk1", a.path()), SourceSpec::new("cache", b.path())],
    );
    let mut labels: Vec<(String, String)> = results
        .iter()
        .map(|r| {
            (
                r.file.source.to_string(),
                r.file.path.file_name().unwrap().to_string_lossy().to_string(),
            )
        })
        .collect();
    labels.sort();
    assert_eq!(
        labels,
        vec![
            ("cache".to_string(), "two".to_string()),
            ("disk1".to_string(), "one".to_string())
        ]
    );
}
