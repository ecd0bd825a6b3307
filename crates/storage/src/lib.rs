pub mod error;
mod file;
mod path;
pub mod transfer;
mod walk;

pub use crate::file::{FileStat, checksum};
pub use crate::path::{is_child, normalize as normalize_path, validate as validate_path};
pub use crate::transfer::Transfer;
pub use crate::walk::{PathWalker, SYNOLOGY_THUMBNAILS};
