//! Error types for the [`duplicates`](super) module.

use derive_more::{Display, Error};

/// A duplicate review error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for duplicate review operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading or updating the cache failed.
    #[display("cache unavailable")]
    Cache,
    /// The file is not below the library root.
    #[display("file is outside the library")]
    Outside,
    /// The cache has no record of the file, so it was never offered as a
    /// duplicate.
    #[display("file is not tracked")]
    NotTracked,
    /// Removing the file (or moving it into the trash) failed.
    #[display("could not remove file")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Storage)
    }
}
