use exn::ResultExt;
use std::io;
use std::path::Path;

use crate::organize::error::{ErrorKind, Result};

/// What already sits at a relocation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collision {
    Free,
    /// Something is there. `identical` when it is a file with the same bytes.
    Taken { identical: bool },
}

/// Compare the occupant of `target` (if any) against a file with the given
/// BLAKE3 `checksum`.
///
/// The occupant is always hashed from disk: it may not be tracked, or its
/// record may be stale.
pub(crate) async fn check(target: &Path, checksum: &str) -> Result<Collision> {
    let metadata = match tokio::fs::symlink_metadata(target).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Collision::Free),
        Err(err) => return Err(err).or_raise(|| ErrorKind::Storage),
    };
    if !metadata.is_file() {
        return Ok(Collision::Taken { identical: false });
    }
    let occupant = shashin_storage::checksum(target).await.or_raise(|| ErrorKind::Storage)?;
    Ok(Collision::Taken { identical: occupant == checksum })
}
