mod hash;
mod metadata;

pub use self::hash::{HASH_BYTES, PerceptualHash};
pub use self::metadata::Metadata;
