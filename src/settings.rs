//! Settings file: catalog location, exclusions, worker policy and sources.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use fileguard_core::{
    DEFAULT_BATCH_SIZE, DigestAlgorithm, ScanConfig, SourceLabel, SourceSpec, VerifyConfig,
    WorkerPolicy,
};

/// Contents of `config.toml`. Every field is optional.
///
/// ```toml
/// database = "/var/lib/fileguard/catalog.db"
/// algorithm = "sha256"
/// exclude = ['/\.Trash-\d+/', '\.partial$']
///
/// [workers]
/// rotational = 1
/// solid_state = 4
///
/// [[sources]]
/// label = "disk1"
/// root = "/mnt/disk1"
/// media = "rotational"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite catalog path.
    pub database: PathBuf,
    pub algorithm: DigestAlgorithm,
    /// Regex patterns matched against full paths.
    pub exclude: Vec<String>,
    pub batch_size: usize,
    /// Hashing workers per medium.
    pub workers: WorkerPolicy,
    /// Hashing workers for verify.
    pub verify_workers: usize,
    /// Sources scanned when no paths are given.
    pub sources: Vec<SourceSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fileguard");
        Self {
            database: data_dir.join("catalog.db"),
            algorithm: DigestAlgorithm::default(),
            exclude: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            workers: WorkerPolicy::default(),
            verify_workers: VerifyConfig::default().workers,
            sources: Vec::new(),
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fileguard").join("config.toml"))
    }

    /// Load `explicit`, or the default file if it exists, or defaults.
    ///
    /// An explicit path must exist; a malformed file is always an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("Cannot read settings from {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("Invalid settings in {}", path.display()))
    }

    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        if settings.batch_size == 0 {
            return Err(eyre!("batch_size must be at least 1"));
        }
        if settings.verify_workers == 0 {
            return Err(eyre!("verify_workers must be at least 1"));
        }
        Ok(settings)
    }

    /// Scan configuration with CLI additions applied.
    pub fn scan_config(&self, full: bool, extra_excludes: &[String]) -> Result<ScanConfig> {
        let mut exclude_patterns = self.exclude.clone();
        exclude_patterns.extend_from_slice(extra_excludes);
        ScanConfig::builder()
            .exclude_patterns(exclude_patterns)
            .incremental(!full)
            .batch_size(self.batch_size)
            .worker_policy(self.workers)
            .algorithm(self.algorithm)
            .build()
            .map_err(|err| eyre!("Invalid scan settings: {err}"))
    }

    /// Verify configuration with CLI overrides applied.
    pub fn verify_config(
        &self,
        quick: bool,
        source: Option<String>,
        workers: Option<usize>,
    ) -> Result<VerifyConfig> {
        VerifyConfig::builder()
            .quick(quick)
            .source(source.map(SourceLabel::from))
            .workers(workers.unwrap_or(self.verify_workers))
            .batch_size(self.batch_size)
            .algorithm(self.algorithm)
            .build()
            .map_err(|err| eyre!("Invalid verify settings: {err}"))
    }
}
