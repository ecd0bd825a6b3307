//! Reviewing groups of visually identical images.
//!
//! Groups come from the cache's perceptual hash index and are checked
//! against the filesystem before they are handed out. How the members of a
//! group are ordered is up to the caller's [`Ranking`].

pub mod error;
mod page;
mod rank;
mod review;

pub use self::page::{DuplicatePage, duplicates_after};
pub use self::rank::{Heuristic, Ranking, Unranked};
pub use self::review::{Deleted, delete_file, ignore, list_ignored, unignore};
