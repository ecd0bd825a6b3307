pub mod consts;
mod dhash;
pub mod error;
mod exiftool;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
mod provider;

pub use crate::dhash::DifferenceHasher;
pub use crate::exiftool::ExifTool;
pub use crate::models::{HASH_BYTES, Metadata, PerceptualHash};
pub use crate::provider::{HashHandle, HashProvider, MetadataHandle, MetadataProvider, MetadataWriter, WriterHandle};
