use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Metadata, PerceptualHash};

/// Reads the tags of a media file.
///
/// Failures are per file: a corrupt or unsupported file returns an error and
/// the next call works as normal.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn metadata(&self, path: &Path) -> Result<Metadata>;
}

/// Computes a perceptual fingerprint from an image's pixels.
#[async_trait]
pub trait HashProvider: Send + Sync {
    async fn hash(&self, path: &Path) -> Result<PerceptualHash>;
}

/// Changes the tags stored inside a media file.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    /// Set `tag` to `value`, keeping the file's modification time.
    async fn write(&self, path: &Path, tag: &str, value: &str) -> Result<()>;
}

pub type MetadataHandle = Arc<dyn MetadataProvider>;
pub type HashHandle = Arc<dyn HashProvider>;
pub type WriterHandle = Arc<dyn MetadataWriter>;
