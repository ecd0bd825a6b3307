//! Operations on a photo library: keeping the cache in step with the files
//! ([`scan`]), filing everything under its date ([`organize`]), bringing new
//! files in ([`import`]) and reviewing look-alikes ([`duplicates`]). Photos
//! missing a capture date can have one written in ([`dates`]).
//!
//! Batch operations are exposed as streams of events so that callers decide
//! how to report progress. A stream ends after yielding a fatal error.

mod context;
pub mod dates;
pub mod duplicates;
pub mod error;
mod hierarchy;
pub mod import;
pub mod organize;
mod prune;
pub mod scan;
#[cfg(test)]
mod testing;

pub use crate::context::Context;
pub use crate::hierarchy::{DEFAULT_HIERARCHY, Hierarchy};
