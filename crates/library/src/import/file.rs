use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use shashin_cache::{FileRecord, Repository};
use shashin_storage::transfer::discard;
use shashin_storage::{FileStat, Transfer, is_child, normalize_path};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::import::error::{ErrorKind, Result as ImportResult};
use crate::organize::error::ErrorKind as OrganizeErrorKind;
use crate::organize::{Organizer, Relocation};
use crate::prune::vanished;
use crate::scan::describe;

/// What to do with an incoming file whose exact bytes are already in the
/// library.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Leave the incoming file where it is.
    #[default]
    #[display("skip")]
    Skip,
    /// Get rid of the incoming file (into the trash, if there is one).
    #[display("delete")]
    Delete,
    /// Import it anyway.
    #[display("import")]
    Import,
}

/// The outcome of (successfully) importing a single file.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportAction {
    /// The file was placed in the library and recorded there.
    Imported { from: PathBuf, relocation: Relocation, record: FileRecord },
    /// The library already holds these bytes; the file was left alone.
    Skipped { from: PathBuf, duplicate_of: PathBuf },
    /// The library already holds these bytes; the file was discarded.
    Deleted { from: PathBuf, duplicate_of: PathBuf, trashed: Option<PathBuf> },
}

impl ImportAction {
    /// The incoming file's original path.
    pub fn source(&self) -> &Path {
        match self {
            Self::Imported { from, .. } | Self::Skipped { from, .. } | Self::Deleted { from, .. } => from,
        }
    }
}

/// Imports a single file from outside the library.
///
/// 1. The file's BLAKE3 checksum is looked up in the cache. When a tracked
///    file that still exists has the same bytes, `policy` decides and the
///    providers are never called.
/// 2. Otherwise metadata (and, for images, a perceptual hash) is extracted,
///    the file is moved or copied into place according to `mode`, and the
///    record is written under its new path.
///
/// # Errors
/// Returns [`Exn<LibraryErrorKind::Import>`](LibraryErrorKind::Import)
/// raised from an inner [`Exn<ErrorKind>`](ErrorKind). A file inside the
/// library is rejected with [`ErrorKind::Source`].
pub async fn import_file(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: impl AsRef<Path>,
    mode: Transfer,
    policy: DuplicatePolicy,
) -> LibraryResult<ImportAction> {
    import_file_inner(cache, ctx, organizer, path.as_ref(), mode, policy).await.or_raise(|| LibraryErrorKind::Import)
}

async fn import_file_inner(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: &Path,
    mode: Transfer,
    policy: DuplicatePolicy,
) -> ImportResult<ImportAction> {
    let path = normalize_path(path).or_raise(|| ErrorKind::Source)?;
    exn::ensure!(!is_child(organizer.root(), &path), ErrorKind::Source);
    let stat = FileStat::read(&path).await.or_raise(|| ErrorKind::Storage)?;
    let (stat, checksum) = fingerprint(stat).await?;
    if let Some(duplicate_of) = known_copy(cache, &checksum, stat.size).await?
        && let Some(action) = apply_policy(ctx, organizer, policy, stat.path.clone(), duplicate_of).await?
    {
        return Ok(action);
    }
    let record = describe(ctx, stat, checksum).await.or_raise(|| ErrorKind::Scan)?;
    place(cache, organizer, record, mode).await
}

pub(crate) async fn fingerprint(stat: FileStat) -> ImportResult<(FileStat, String)> {
    let checksum = shashin_storage::checksum(&stat.path).await.or_raise(|| ErrorKind::Storage)?;
    Ok((stat, checksum))
}

/// A tracked file with exactly these bytes that is still on disk.
pub(crate) async fn known_copy(cache: &Repository, checksum: &str, size: u64) -> ImportResult<Option<PathBuf>> {
    let records = cache.get_by_checksum(checksum, size).await.or_raise(|| ErrorKind::Cache)?;
    for record in records {
        if !vanished(&record.path).await {
            return Ok(Some(record.path));
        }
    }
    Ok(None)
}

/// Act on a content duplicate. `None` means import it anyway. A dry run
/// reports a deletion without discarding anything.
pub(crate) async fn apply_policy(
    ctx: &Context,
    organizer: &Organizer,
    policy: DuplicatePolicy,
    from: PathBuf,
    duplicate_of: PathBuf,
) -> ImportResult<Option<ImportAction>> {
    match policy {
        DuplicatePolicy::Skip => {
            info!(path = %from.display(), duplicate_of = %duplicate_of.display(), "already in library; skipping");
            Ok(Some(ImportAction::Skipped { from, duplicate_of }))
        },
        DuplicatePolicy::Delete if organizer.is_dry_run() => {
            info!(path = %from.display(), duplicate_of = %duplicate_of.display(), "already in library; would discard");
            Ok(Some(ImportAction::Deleted { from, duplicate_of, trashed: None }))
        },
        DuplicatePolicy::Delete => {
            let trashed = discard(&from, ctx.trash()).await.or_raise(|| ErrorKind::Storage)?;
            info!(path = %from.display(), duplicate_of = %duplicate_of.display(), "already in library; discarded");
            Ok(Some(ImportAction::Deleted { from, duplicate_of, trashed }))
        },
        DuplicatePolicy::Import => Ok(None),
    }
}

/// Relocate an incoming file into the library and record it there. A dry run
/// only plans the relocation; the returned record keeps the incoming path.
pub(crate) async fn place(
    cache: &Repository,
    organizer: &Organizer,
    record: FileRecord,
    mode: Transfer,
) -> ImportResult<ImportAction> {
    let from = record.path.clone();
    let relocation = match organizer.relocate(&record, mode).await {
        Ok(relocation) => relocation,
        Err(err) if matches!(&*err, OrganizeErrorKind::Invariant) => return Err(err.raise(ErrorKind::Invariant)),
        Err(err) => return Err(err.raise(ErrorKind::Organize)),
    };
    if organizer.is_dry_run() {
        return Ok(ImportAction::Imported { from, relocation, record });
    }
    let stat = FileStat::read(relocation.path()).await.or_raise(|| ErrorKind::Storage)?;
    let record = record.relocated(stat);
    let written = match mode {
        // A moved file may have been tracked where it came from.
        Transfer::Move => cache.replace(&from, &record).await,
        Transfer::Copy => cache.upsert(&record).await,
    };
    written.or_raise(|| ErrorKind::Cache)?;
    Ok(ImportAction::Imported { from, relocation, record })
}
