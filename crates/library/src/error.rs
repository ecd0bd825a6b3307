//! Library Error Types
//!
//! Each operation module (`scan`, `organize`, `import`, ...) has its own
//! `ErrorKind` describing which dependency failed; at the public boundary
//! those are wrapped into the [`ErrorKind`] here, which only says which
//! operation failed. Walk the [`exn::Exn`] tree for the details.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("scan failed")]
    Scan,
    #[display("organize failed")]
    Organize,
    #[display("import failed")]
    Import,
    #[display("duplicate review failed")]
    Duplicates,
    #[display("date fix failed")]
    FixDates,
    /// A hierarchy expression could not be parsed.
    #[display("invalid hierarchy expression {_0:?}")]
    Hierarchy(#[error(not(source))] String),
    /// None of the hierarchy's date tags resolved to a calendar date.
    #[display("no usable date in tags {_0}")]
    Undated(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Operation-level failures carry their cause as a child in the error
    /// tree, so this is never decided here.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
