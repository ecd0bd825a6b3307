//! Extraction Error Types
//!
//! Provider failures are per-file problems: the caller records them against
//! the file and moves on. Only a missing or crashed `exiftool` process affects
//! every file after it.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required external program is not on `PATH`.
    #[display("{_0} is not installed")]
    NotInstalled(#[error(not(source))] &'static str),
    /// Talking to the external program failed (it crashed, or its pipes broke).
    #[display("metadata process failed")]
    Process,
    /// The file could not be read at all.
    #[display("unreadable file: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// The provider looked at the file and declined it (corrupt, or a format
    /// it does not understand).
    #[display("unsupported file {}: {_1}", _0.display())]
    Unsupported(#[error(not(source))] PathBuf, #[error(not(source))] String),
    /// Provider output (or a cached copy of it) could not be interpreted.
    #[display("invalid metadata: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// A stored perceptual hash has the wrong width.
    #[display("perceptual hash must be {} bytes, found {_0}", crate::HASH_BYTES)]
    InvalidHash(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Process)
    }
}
