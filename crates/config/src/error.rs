//! Config Error Types
//!
//! Every one of these is fatal: nothing should touch the library with a
//! configuration that did not load or did not validate.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A config error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly named config file does not exist.
    #[display("config file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The layered sources could not be merged into a [`Config`](crate::Config).
    #[display("could not load configuration")]
    Load,
    #[display("concurrency must be at least 1")]
    Concurrency,
    /// The library path exists but is something other than a directory.
    #[display("library is not a directory: {}", _0.display())]
    Library(#[error(not(source))] PathBuf),
    /// The import source is the library, lies inside it, or contains it.
    #[display("import source {} overlaps the library", _0.display())]
    ImportSource(#[error(not(source))] PathBuf),
    /// The trash lies inside the library or the import source, where the
    /// next run would pick deleted files up again.
    #[display("trash {} lies inside a directory shashin walks", _0.display())]
    Trash(#[error(not(source))] PathBuf),
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
