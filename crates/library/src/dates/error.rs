//! Error types for the [`dates`](super) module.

use derive_more::{Display, Error};

/// A date fix error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for date fixes.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a date fix failure.
///
/// ### Fatal Errors
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Root`]
///
/// ### Per-file Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Scan`]
/// - [`ErrorKind::Metadata`]
/// - [`ErrorKind::NoDate`]
/// - [`ErrorKind::Write`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("cache unavailable")]
    Cache,
    /// The root is missing or unreadable.
    #[display("cannot read root")]
    Root,
    #[display("cannot read file")]
    Storage,
    /// Refreshing the file's record after the check or the write failed.
    #[display("cannot rescan file")]
    Scan,
    /// The metadata provider rejected the file.
    #[display("metadata extraction failed")]
    Metadata,
    /// The file has no modification date to copy from.
    #[display("no modification date to copy")]
    NoDate,
    /// The metadata writer refused the new tag.
    #[display("cannot write capture date")]
    Write,
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
