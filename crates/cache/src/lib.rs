//! SQLite cache of everything learned about the files in a library.
//!
//! The cache is not the source of truth, the files are. Each row remembers the
//! `(mtime, size)` a file had when its checksum, perceptual hash and metadata
//! were computed; as long as the live file still matches, those values are
//! reused instead of asking the (slow) providers again. Deleting the database
//! only costs a full rescan.
//!
//! Alongside the files the cache keeps the set of perceptual hashes an
//! operator dismissed as "not duplicates".

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{DuplicateGroup, FileRecord, Upsert};
pub use crate::repo::Repository;
