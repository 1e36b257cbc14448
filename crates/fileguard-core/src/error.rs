//! Error types for walking and hashing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while walking a source or hashing a file.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Path exists but is not a regular file.
    #[error("Not a regular file: {path}")]
    NotAFile { path: PathBuf },

    /// An exclusion pattern failed to compile.
    #[error("Invalid exclude pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A pipeline thread could not be started or panicked.
    #[error("Pipeline thread {name} failed")]
    ThreadFailed { name: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error means the path no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory entry.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Path is not valid UTF-8 and cannot be cataloged.
    NonUtf8Path,
}

/// Non-fatal warning encountered during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        let kind = if error.kind() == std::io::ErrorKind::PermissionDenied {
            WarningKind::PermissionDenied
        } else {
            WarningKind::ReadError
        };
        Self {
            message: format!("Read error: {error}"),
            path,
            kind,
        }
    }

    /// Create a warning for a path that cannot be stored as text.
    pub fn non_utf8(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Path is not valid UTF-8: {}", path.display()),
            path,
            kind: WarningKind::NonUtf8Path,
        }
    }
}
