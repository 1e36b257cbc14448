//! JWalk-based file walker.

use std::path::Path;
use std::sync::Arc;

use jwalk::{DirEntryIter, Parallelism, WalkDir};
use tracing::{debug, warn};

use fileguard_core::{FileDescriptor, FileStat, ScanError, ScanWarning, SourceLabel, WarningKind};

use crate::exclude::ExcludeSet;

/// Enumerates regular files under a root.
///
/// Each call to [`Walker::walk`] is independent; the walker carries only its
/// own exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    excludes: Arc<ExcludeSet>,
    threads: usize,
}

impl Walker {
    /// Create a walker with the given exclusion rules.
    pub fn new(excludes: ExcludeSet) -> Self {
        Self {
            excludes: Arc::new(excludes),
            threads: 0,
        }
    }

    /// Read directories with `n` threads (0 or 1 = serial).
    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    /// Exclusion rules in use.
    pub fn excludes(&self) -> &ExcludeSet {
        &self.excludes
    }

    /// Start walking `root`, labelling every file with `source`.
    ///
    /// The root is canonicalized first, so every yielded path is absolute.
    /// Fails only if the root itself cannot be opened; problems with entries
    /// below the root are yielded as warnings.
    pub fn walk(&self, root: &Path, source: impl Into<SourceLabel>) -> Result<Walk, ScanError> {
        let root = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
        let metadata = std::fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }
        std::fs::read_dir(&root).map_err(|e| ScanError::io(&root, e))?;

        let parallelism = match self.threads {
            0 | 1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let excludes = Arc::clone(&self.excludes);
        let inner = WalkDir::new(&root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .process_read_dir(move |_depth, _dir, _state, children| {
                if excludes.is_empty() {
                    return;
                }
                // Dropping an entry here also prunes its subtree before it is read.
                children.retain(|child| match child {
                    Ok(entry) => {
                        let path = entry.path();
                        if excludes.is_excluded(&path) {
                            debug!(path = %path.display(), "excluded");
                            false
                        } else {
                            true
                        }
                    }
                    Err(_) => true,
                });
            })
            .into_iter();

        Ok(Walk {
            inner,
            source: source.into(),
        })
    }
}

/// Lazy sequence of files produced by [`Walker::walk`].
pub struct Walk {
    inner: DirEntryIter<((), ())>,
    source: SourceLabel,
}

impl Iterator for Walk {
    type Item = Result<FileDescriptor, ScanWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::read_error(&path, io),
                        None => ScanWarning::new(&path, err.to_string(), WarningKind::ReadError),
                    };
                    warn!(source = %self.source, path = %path.display(), "{}", warning.message);
                    return Some(Err(warning));
                }
            };

            // Symlinks, sockets, devices and directories are not cataloged.
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.to_str().is_none() {
                let warning = ScanWarning::non_utf8(&path);
                warn!(source = %self.source, "{}", warning.message);
                return Some(Err(warning));
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warn!(source = %self.source, path = %path.display(), "stat failed: {err}");
                    return Some(Err(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    )));
                }
            };

            // Empty files carry nothing to verify. A file truncated to zero
            // bytes therefore drops out of tracking instead of being flagged.
            if metadata.len() == 0 {
                continue;
            }

            return Some(Ok(FileDescriptor::new(
                path,
                self.source.clone(),
                FileStat::from_metadata(&metadata),
            )));
        }
    }
}

/// Suggested directory-reading threads for a source with `workers` hashers.
pub(crate) fn walk_threads_for(workers: usize) -> usize {
    if workers <= 1 { 1 } else { 2 }
}
