use exn::ResultExt;
use shashin_cache::Repository;
use shashin_extract::PerceptualHash;
use shashin_storage::transfer::{discard, remove_if_empty};
use shashin_storage::{is_child, normalize_path};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Context;
use crate::duplicates::error::{ErrorKind, Result as DuplicatesResult};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::organize::Organizer;
use crate::prune::vanished;

/// Mark every file sharing `hash` as "not duplicates". Returns `false` if
/// the hash was already dismissed.
///
/// The dismissal lasts until one of those files is rewritten with a
/// different hash.
pub async fn ignore(cache: &Repository, hash: &PerceptualHash) -> LibraryResult<bool> {
    cache.ignore(hash).await.or_raise(|| LibraryErrorKind::Duplicates)
}

/// Bring a dismissed hash back. Returns `false` if it was not dismissed.
pub async fn unignore(cache: &Repository, hash: &PerceptualHash) -> LibraryResult<bool> {
    cache.unignore(hash).await.or_raise(|| LibraryErrorKind::Duplicates)
}

pub async fn list_ignored(cache: &Repository) -> LibraryResult<Vec<PerceptualHash>> {
    cache.list_ignored().await.or_raise(|| LibraryErrorKind::Duplicates)
}

/// A library file removed during duplicate review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub path: PathBuf,
    /// Where the file went, when a trash directory is configured and the
    /// file still existed.
    pub trashed: Option<PathBuf>,
}

/// Remove a tracked library file: the file goes into the trash (or is
/// unlinked), then its record is dropped, then its directory is removed if
/// that left it empty.
///
/// A file that is already gone from disk only loses its record.
///
/// # Errors
/// Returns [`Exn<LibraryErrorKind::Duplicates>`](LibraryErrorKind::Duplicates)
/// raised from an inner [`Exn<ErrorKind>`](ErrorKind). Files outside the
/// library or unknown to the cache are refused without touching anything.
pub async fn delete_file(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: impl AsRef<Path>,
) -> LibraryResult<Deleted> {
    delete_file_inner(cache, ctx, organizer, path.as_ref()).await.or_raise(|| LibraryErrorKind::Duplicates)
}

async fn delete_file_inner(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: &Path,
) -> DuplicatesResult<Deleted> {
    let path = normalize_path(path).or_raise(|| ErrorKind::Outside)?;
    exn::ensure!(is_child(organizer.root(), &path), ErrorKind::Outside);
    exn::ensure!(cache.get(&path).await.or_raise(|| ErrorKind::Cache)?.is_some(), ErrorKind::NotTracked);

    let trashed = match vanished(&path).await {
        true => None,
        false => discard(&path, ctx.trash()).await.or_raise(|| ErrorKind::Storage)?,
    };
    cache.delete(&path).await.or_raise(|| ErrorKind::Cache)?;
    info!(path = %path.display(), trashed = ?trashed, "deleted duplicate");

    if let Some(parent) = path.parent()
        && parent != organizer.root()
        && let Err(err) = remove_if_empty(parent).await
    {
        warn!(path = %parent.display(), error = ?err, "could not remove emptied directory");
    }
    Ok(Deleted { path, trashed })
}
