//! Error types for the [`organize`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// An organize error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for organize operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an organize failure.
///
/// Each variant identifies the subsystem that failed, allowing callers to
/// inspect the error tree without matching on opaque strings.
///
/// ### Fatal Errors
/// - [`ErrorKind::Root`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Invariant`]
///
/// ### Per-file Errors
/// - [`ErrorKind::Hierarchy`]
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Scan`] - the file had to be scanned before it could be
///   placed, and that failed.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The library root is missing or not a directory.
    #[display("library root is unusable")]
    Root,
    /// A cache lookup or update via [`shashin_cache::Repository`] failed.
    #[display("cache unavailable")]
    Cache,
    /// A relocation was about to overwrite a file or leave the library root.
    /// Nothing was touched, but the batch must stop.
    #[display("refusing to relocate")]
    Invariant,
    /// No destination could be derived from the file's metadata.
    #[display("no destination for file")]
    Hierarchy,
    /// Moving or copying the file failed.
    #[display("relocation failed")]
    Storage,
    #[display("scan before relocation failed")]
    Scan,
}

impl ErrorKind {
    /// Returns `true` if the whole batch has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Root | Self::Cache | Self::Invariant)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Storage)
    }
}
