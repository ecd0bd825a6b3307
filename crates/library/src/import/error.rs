//! Error types for the [`import`](super) module.

use derive_more::{Display, Error};

/// An import error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an import failure.
///
/// ### Fatal Errors
/// - [`ErrorKind::Root`]
/// - [`ErrorKind::Source`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Invariant`]
///
/// ### Per-file Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Scan`]
/// - [`ErrorKind::Organize`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The library root is missing or not a directory.
    #[display("library root is unusable")]
    Root,
    /// The import source is missing, or overlaps the library.
    #[display("unusable import source")]
    Source,
    /// A cache lookup or update via [`shashin_cache::Repository`] failed.
    #[display("cache unavailable")]
    Cache,
    /// The organizer refused a relocation that would have overwritten a file
    /// or left the library.
    #[display("refusing to relocate")]
    Invariant,
    /// Reading, hashing or discarding the incoming file failed.
    #[display("cannot read incoming file")]
    Storage,
    #[display("metadata extraction failed")]
    Scan,
    /// The file could not be placed in the library.
    #[display("cannot place file in library")]
    Organize,
}

impl ErrorKind {
    /// Returns `true` if the whole batch has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Root | Self::Source | Self::Cache | Self::Invariant)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Storage)
    }
}
