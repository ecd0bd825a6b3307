//! Difference hash ("dhash") provider.
//!
//! Two 64-bit gradient hashes are taken from the same image: one over
//! horizontally adjacent pixels, one over vertically adjacent pixels. Their
//! concatenation is the 128-bit [`PerceptualHash`]. Recompression, resizing
//! and small colour shifts leave the gradients, and therefore the hash,
//! (nearly) unchanged.

use async_trait::async_trait;
use exn::ResultExt;
use image::{DynamicImage, ImageError};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{HASH_BYTES, PerceptualHash};
use crate::provider::HashProvider;

const SIZE: u32 = 8;

/// [`HashProvider`] computing a 128-bit row + column difference hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct DifferenceHasher;

impl DifferenceHasher {
    fn hasher(alg: HashAlg) -> Hasher {
        HasherConfig::new().hash_alg(alg).hash_size(SIZE, SIZE).to_hasher()
    }

    pub fn hash_image(image: &DynamicImage) -> PerceptualHash {
        let rows = Self::hasher(HashAlg::Gradient).hash_image(image);
        let columns = Self::hasher(HashAlg::VertGradient).hash_image(image);
        let mut bytes = [0u8; HASH_BYTES];
        for (slot, byte) in bytes.iter_mut().zip(rows.as_bytes().iter().chain(columns.as_bytes())) {
            *slot = *byte;
        }
        PerceptualHash::new(bytes)
    }

    fn hash_file(path: &Path) -> Result<PerceptualHash> {
        let image = image::open(path).map_err(|err| match err {
            ImageError::IoError(_) => ErrorKind::Unreadable(path.to_path_buf()),
            other => ErrorKind::Unsupported(path.to_path_buf(), other.to_string()),
        })?;
        Ok(Self::hash_image(&image))
    }
}

#[async_trait]
impl HashProvider for DifferenceHasher {
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    async fn hash(&self, path: &Path) -> Result<PerceptualHash> {
        let path = path.to_path_buf();
        // Decoding a 24MP JPEG takes long enough to stall the runtime.
        tokio::task::spawn_blocking(move || Self::hash_file(&path)).await.or_raise(|| ErrorKind::Process)?
    }
}
