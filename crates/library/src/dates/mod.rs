//! Giving undated photos a capture date.
//!
//! Photos without a `DateTimeOriginal` tag get one copied from their
//! `FileModifyDate`, written into the file itself. [`fix_date`] handles one
//! file; [`fix_dates`] goes through every cached photo below a root that has
//! no capture date.

pub mod error;
mod file;
mod stream;

pub use self::file::{DateFix, fix_date};
pub use self::stream::{FixDatesEvent, FixDatesSummary, fix_dates};
