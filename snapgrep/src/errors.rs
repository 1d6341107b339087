/// Error types for snapgrep.
///
/// Errors fall into three groups, and callers treat each differently:
///
/// 1. **Request errors** (`InvalidPattern`, `InvalidPathPattern`, `InvalidRequest`)
///    are raised before any file is touched. They abort the whole request and
///    retrying the same request will fail the same way.
///
/// 2. **Archive errors** (`ArchiveAccess`) mean the snapshot itself could not be
///    opened. They also abort the request.
///
/// 3. **File errors** (`FileRead`, `TruncatedRead`) are local to one archive
///    entry. The scanner logs them, skips the entry and keeps going:
///    ```rust,ignore
///    match ctx.find(archive, index) {
///        Ok(found) => // Merge into results,
///        Err(e) => warn!("Skipping {}: {}", entry.name, e),
///    }
///    ```
///
/// Hitting a resource limit is never an error. It is reported through the
/// `limit_hit` flags on the results instead.
use std::io;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur while compiling or running a search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid path pattern {pattern:?}: {reason}")]
    InvalidPathPattern { pattern: String, reason: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Archive unavailable: {0}")]
    ArchiveAccess(String),
    #[error("Failed to read {path}: {source}")]
    FileRead { path: String, source: io::Error },
    #[error("Truncated read of {path}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl SearchError {
    pub fn invalid_pattern(reason: impl Into<String>) -> Self {
        Self::InvalidPattern(reason.into())
    }

    pub fn invalid_path_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPathPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn archive_access(reason: impl Into<String>) -> Self {
        Self::ArchiveAccess(reason.into())
    }

    pub fn file_read(path: impl Into<String>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn truncated_read(path: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::TruncatedRead {
            path: path.into(),
            expected,
            actual,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the error is confined to a single archive entry.
    pub fn is_file_local(&self) -> bool {
        matches!(self, Self::FileRead { .. } | Self::TruncatedRead { .. })
    }
}
