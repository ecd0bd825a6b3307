use exn::ResultExt;
use shashin_cache::{FileRecord, Repository};
use shashin_storage::{FileStat, Transfer};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::organize::Organizer;
use crate::organize::error::{ErrorKind, Result as OrganizeResult};
use crate::organize::relocate::Relocation;
use crate::scan::{Lookup, extract, lookup};

/// The outcome of (successfully) organizing a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct Organized {
    /// Where the file was before.
    pub from: PathBuf,
    pub relocation: Relocation,
    /// The cache record as it stands now.
    pub record: FileRecord,
}

/// Moves a single library file to where its metadata says it belongs, and
/// keeps its cache record pointing at it.
///
/// A fresh cache record is trusted as-is; otherwise the file is scanned
/// first. When the file does not move, a freshly scanned record is still
/// written back.
///
/// # Errors
/// Returns [`Exn<LibraryErrorKind::Organize>`](LibraryErrorKind::Organize)
/// raised from an inner [`Exn<ErrorKind>`](ErrorKind).
pub async fn organize_file(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: impl AsRef<Path>,
) -> LibraryResult<Organized> {
    organize_file_inner(cache, ctx, organizer, path.as_ref()).await.or_raise(|| LibraryErrorKind::Organize)
}

async fn organize_file_inner(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    path: &Path,
) -> OrganizeResult<Organized> {
    let stat = FileStat::read(path).await.or_raise(|| ErrorKind::Storage)?;
    let (record, fresh) = match lookup(cache, stat).await.or_raise(|| ErrorKind::Cache)? {
        Lookup::Fresh(record) => (record, true),
        Lookup::Stale(stat) => (extract(ctx, stat).await.or_raise(|| ErrorKind::Scan)?, false),
    };
    settle(cache, organizer, record, fresh).await
}

/// Relocate a library file (always by moving it) and bring the cache in line.
///
/// The old record is replaced by the new one in a single transaction, so the
/// cache never points at both or neither. `fresh` records that came straight
/// from the cache and need no write when the file stays put. In a dry run the
/// file stays put whatever the plan says.
pub(crate) async fn settle(
    cache: &Repository,
    organizer: &Organizer,
    record: FileRecord,
    fresh: bool,
) -> OrganizeResult<Organized> {
    let from = record.path.clone();
    let relocation = match organizer.relocate(&record, Transfer::Move).await {
        Ok(relocation) => relocation,
        Err(err) => {
            // The file could not be placed but its scan is still worth keeping.
            if !fresh && !err.is_fatal() {
                cache.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
            }
            return Err(err);
        },
    };
    let record = match &relocation {
        Relocation::Relocated(_) | Relocation::Disambiguated { .. } if organizer.is_dry_run() => {
            if !fresh {
                cache.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
            }
            record
        },
        Relocation::AlreadyInPlace(_) => {
            if !fresh {
                cache.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
            }
            record
        },
        Relocation::Relocated(path) | Relocation::Disambiguated { path, .. } => {
            let stat = FileStat::read(path).await.or_raise(|| ErrorKind::Storage)?;
            let record = record.relocated(stat);
            cache.replace(&from, &record).await.or_raise(|| ErrorKind::Cache)?;
            record
        },
    };
    Ok(Organized { from, relocation, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hierarchy;
    use crate::testing::{Fixture, photo};

    async fn organizer(fx: &Fixture) -> Organizer {
        std::fs::create_dir_all(fx.path("lib")).unwrap();
        Organizer::new(fx.path("lib"), Hierarchy::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_file_is_scanned_and_moved() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        let path = fx.write("lib/a.jpg", b"a");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let organized = organize_file(&fx.cache, &fx.ctx, &organizer, &path).await.unwrap();
        let expected = fx.path("lib/2018/10/21/a.jpg");
        assert_eq!(organized.from, path);
        assert_eq!(organized.relocation, Relocation::Relocated(expected.clone()));
        assert_eq!(organized.record.path, expected);
        assert_eq!(fx.cache.get(&path).await.unwrap(), None);
        assert_eq!(fx.cache.get(&expected).await.unwrap(), Some(organized.record));
    }

    #[tokio::test]
    async fn test_fresh_record_skips_providers() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        let path = fx.write("lib/a.jpg", b"a");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        crate::scan::scan_file(&fx.cache, &fx.ctx, &path).await.unwrap();
        assert_eq!(fx.metadata.calls(), 1);

        let organized = organize_file(&fx.cache, &fx.ctx, &organizer, &path).await.unwrap();
        assert!(matches!(organized.relocation, Relocation::Relocated(_)));
        assert_eq!(fx.metadata.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        let path = fx.write("lib/a.jpg", b"a");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let first = organize_file(&fx.cache, &fx.ctx, &organizer, &path).await.unwrap();
        let placed = first.relocation.path().to_path_buf();
        let mtime = std::fs::metadata(&placed).unwrap().modified().unwrap();

        let second = organize_file(&fx.cache, &fx.ctx, &organizer, &placed).await.unwrap();
        assert_eq!(second.relocation, Relocation::AlreadyInPlace(placed.clone()));
        assert_eq!(second.record, first.record);
        assert_eq!(std::fs::metadata(&placed).unwrap().modified().unwrap(), mtime);
        assert_eq!(fx.metadata.calls(), 1);
    }

    #[tokio::test]
    async fn test_unplaceable_file_is_still_cached() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        let path = fx.write("lib/undated.jpg", b"u");
        fx.metadata.set("undated.jpg", photo("0000:00:00 00:00:00"));

        let err = organize_file(&fx.cache, &fx.ctx, &organizer, &path).await.unwrap_err();
        assert!(matches!(&*err, LibraryErrorKind::Organize));
        assert!(path.exists());
        assert!(fx.cache.get(&path).await.unwrap().is_some());
    }
}
