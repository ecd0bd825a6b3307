use futures::TryStreamExt;
use shashin_cache::Repository;
use shashin_cache::error::Result as CacheResult;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;

/// Whether nothing exists at `path` any more. Broken symlinks count as gone;
/// files we merely cannot stat do not.
pub(crate) async fn vanished(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_err_and(|err| err.kind() == io::ErrorKind::NotFound)
}

/// Drop every record below `root` whose file has vanished.
pub(crate) async fn prune_missing(cache: &Repository, root: &Path) -> CacheResult<Vec<PathBuf>> {
    let mut gone = HashSet::new();
    {
        let mut records = pin!(cache.list());
        while let Some(record) = records.try_next().await? {
            if record.path.starts_with(root) && vanished(&record.path).await {
                gone.insert(record.path);
            }
        }
    }
    cache.prune(|record| gone.contains(&record.path)).await
}
