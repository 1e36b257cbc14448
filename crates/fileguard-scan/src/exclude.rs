//! Path exclusion rules.

use std::path::Path;

use regex::RegexSet;

use fileguard_core::ScanError;

/// Compiled exclusion patterns owned by one walker.
///
/// Patterns are regular expressions matched (unanchored) against the full
/// path of each entry.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    set: RegexSet,
}

impl ExcludeSet {
    /// Compile `patterns`, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();

        // Compile individually first so the error names the offending pattern.
        for pattern in &patterns {
            if let Err(err) = regex::Regex::new(pattern) {
                return Err(ScanError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                });
            }
        }

        let set = RegexSet::new(&patterns).map_err(|err| ScanError::InvalidPattern {
            pattern: patterns.join(" | "),
            message: err.to_string(),
        })?;
        Ok(Self { set })
    }

    /// An empty set that excludes nothing.
    pub fn empty() -> Self {
        Self {
            set: RegexSet::empty(),
        }
    }

    /// Whether `path` matches any pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.set.is_empty() {
            return false;
        }
        self.set.is_match(&path.to_string_lossy())
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self::empty()
    }
}
