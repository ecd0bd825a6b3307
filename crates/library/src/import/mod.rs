//! Bringing files from outside into the library.
//!
//! Every incoming file is checked against the content checksums the cache
//! already knows. What happens to a file whose bytes are already in the
//! library is the caller's [`DuplicatePolicy`]; everything else is placed by
//! the [`Organizer`](crate::organize::Organizer) and recorded under its new
//! path.

pub mod error;
mod file;
mod stream;

pub use self::file::{DuplicatePolicy, ImportAction, import_file};
pub use self::stream::{ImportEvent, ImportSummary, import};
