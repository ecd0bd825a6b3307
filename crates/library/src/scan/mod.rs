//! Keeping the cache in step with the filesystem.
//!
//! [`scan_file`] handles one file: a fresh cache record short-circuits
//! everything, otherwise the metadata and hash providers run and the result
//! is written back. [`scan`] does that for every file below a root and then
//! prunes records whose files have disappeared.

pub mod error;
mod file;
mod stream;

pub use self::file::{Scan, ScanAction, scan_file};
pub(crate) use self::file::{Lookup, describe, extract, lookup, persist};
pub use self::stream::{ScanEvent, ScanSummary, scan};
