//! Error types for the [`scan`](super) module.

use derive_more::{Display, Error};

/// A scan error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a scan failure.
///
/// ### Fatal Errors
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Root`]
///
/// ### Per-file Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Metadata`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A cache lookup or update via [`shashin_cache::Repository`] failed.
    #[display("cache unavailable")]
    Cache,
    /// The scan root is missing or unreadable.
    #[display("cannot scan root")]
    Root,
    /// Walking, stat or checksum of a single file failed.
    #[display("cannot read file")]
    Storage,
    /// The metadata provider rejected the file.
    #[display("metadata extraction failed")]
    Metadata,
}

impl ErrorKind {
    /// Returns `true` if the whole run has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cache | Self::Root)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Storage)
    }
}
