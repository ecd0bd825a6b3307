//! Storage Error Types
//!
//! Every filesystem failure carries the path it happened on, so per-file
//! diagnostics further up the stack can name the file without extra context.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use tokio::task::JoinError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// A transfer was about to overwrite an existing path.
    #[display("refusing to overwrite existing path: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Something other than a directory sits where a directory is required.
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error on {}: {_1}", _0.display())]
    Io(#[error(not(source))] PathBuf, #[error(source)] IoError),
    /// Path is relative, empty, or escapes its root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A blocking or spawned filesystem task died before reporting back.
    #[display("filesystem task did not complete")]
    Interrupted(JoinError),
}

impl ErrorKind {
    pub(crate) fn from_io(err: IoError, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            std::io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            _ => Self::Io(path, err),
        }
    }

    /// The path the error is about, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::AlreadyExists(p)
            | Self::NotADirectory(p)
            | Self::Io(p, _)
            | Self::InvalidPath(p) => Some(p),
            Self::Interrupted(_) => None,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(..) | Self::Interrupted(_))
    }

    /// Returns `true` if the error means a no-overwrite guard fired.
    ///
    /// Callers must stop the batch: the organizer computed a destination it
    /// believed was free and it was not.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
