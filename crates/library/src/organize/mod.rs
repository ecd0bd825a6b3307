//! Placing files where their metadata says they belong.
//!
//! An [`Organizer`] turns a file's metadata into a destination directory via
//! its [`Hierarchy`](crate::Hierarchy) and moves or copies the file there,
//! never replacing anything that is already in the way. [`organize_file`]
//! does that for one library file and keeps its cache record in step;
//! [`organize`] does it for the whole library and tidies up afterwards.

mod conflict;
pub mod error;
mod file;
mod relocate;
mod stream;

pub use self::file::{Organized, organize_file};
pub use self::relocate::{Organizer, Relocation};
pub use self::stream::{OrganizeEvent, OrganizeSummary, organize};
