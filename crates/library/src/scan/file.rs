use derive_more::Display;
use exn::ResultExt;
use shashin_cache::{FileRecord, Repository, Upsert};
use shashin_storage::FileStat;
use std::path::Path;
use tracing::{instrument, warn};

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::scan::error::{ErrorKind, Result as ScanResult};

/// What scanning a file did to the cache.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    /// The cached record was fresh; no provider was called.
    #[display("skipped")]
    Skipped,
    /// First time this path was seen.
    #[display("inserted")]
    Inserted,
    /// The file changed since its record was written.
    #[display("updated")]
    Updated,
}

impl From<Upsert> for ScanAction {
    fn from(upsert: Upsert) -> Self {
        match upsert {
            Upsert::Inserted => Self::Inserted,
            Upsert::Updated => Self::Updated,
        }
    }
}

/// The result of scanning a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub record: FileRecord,
    pub action: ScanAction,
}

/// Whether a file needs the providers.
pub(crate) enum Lookup {
    Fresh(FileRecord),
    Stale(FileStat),
}

/// Scans a single file, reusing its cached record when the file has not
/// changed since it was written.
///
/// 1. **Fresh**: the stored `(mtime, size)` matches the file on disk, the
///    record is returned as-is ([`ScanAction::Skipped`]).
/// 2. **Stale or unknown**: metadata is extracted; images are also hashed.
///    A hash failure only costs the file its perceptual hash. The new record
///    replaces the old one in a single write.
pub async fn scan_file(cache: &Repository, ctx: &Context, path: impl AsRef<Path>) -> LibraryResult<Scan> {
    scan_file_inner(cache, ctx, path.as_ref()).await.or_raise(|| LibraryErrorKind::Scan)
}

async fn scan_file_inner(cache: &Repository, ctx: &Context, path: &Path) -> ScanResult<Scan> {
    let stat = FileStat::read(path).await.or_raise(|| ErrorKind::Storage)?;
    match lookup(cache, stat).await? {
        Lookup::Fresh(record) => Ok(Scan { record, action: ScanAction::Skipped }),
        Lookup::Stale(stat) => persist(cache, extract(ctx, stat).await?).await,
    }
}

pub(crate) async fn lookup(cache: &Repository, stat: FileStat) -> ScanResult<Lookup> {
    match cache.get_if_fresh(&stat).await.or_raise(|| ErrorKind::Cache)? {
        Some(record) => Ok(Lookup::Fresh(record)),
        None => Ok(Lookup::Stale(stat)),
    }
}

/// Run the providers over a file and build the record describing it. Touches
/// neither the cache nor the file.
pub(crate) async fn extract(ctx: &Context, stat: FileStat) -> ScanResult<FileRecord> {
    let checksum = shashin_storage::checksum(&stat.path).await.or_raise(|| ErrorKind::Storage)?;
    describe(ctx, stat, checksum).await
}

/// [`extract`] for a file whose checksum is already known.
#[instrument(level = "debug", skip_all, fields(path = %stat.path.display()))]
pub(crate) async fn describe(ctx: &Context, stat: FileStat, checksum: String) -> ScanResult<FileRecord> {
    let metadata = ctx.metadata.metadata(&stat.path).await.or_raise(|| ErrorKind::Metadata)?;
    let hash = if metadata.is_image() {
        match ctx.hasher.hash(&stat.path).await {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(path = %stat.path.display(), error = %err, "no perceptual hash; tracking without one");
                None
            },
        }
    } else {
        None
    };
    Ok(FileRecord::new(stat, checksum, hash, metadata))
}

pub(crate) async fn persist(cache: &Repository, record: FileRecord) -> ScanResult<Scan> {
    let action = cache.upsert(&record).await.or_raise(|| ErrorKind::Cache)?.into();
    Ok(Scan { record, action })
}
