use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use shashin_cache::Repository;
use shashin_storage::transfer::remove_empty_dirs;
use shashin_storage::{FileStat, Transfer, is_child, normalize_path};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::import::error::{Error as ImportError, ErrorKind, Result as ImportResult};
use crate::import::file::{apply_policy, fingerprint, known_copy, place};
use crate::import::{DuplicatePolicy, ImportAction};
use crate::organize::{Organizer, Relocation};
use crate::scan::describe;

/// Progress events emitted by [`import`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Handled`](Self::Handled) for content duplicates, as they are found.
/// 3. [`Discovered`](Self::Discovered): exactly once.
/// 4. [`Handled`](Self::Handled) for every other file.
/// 5. [`CleanedUp`](Self::CleanedUp): exactly once.
/// 6. [`Complete`](Self::Complete): exactly once.
///
/// [`Failed`](Self::Failed) may appear anywhere after `Started`. A fatal
/// error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum ImportEvent {
    Started { source: PathBuf, library: PathBuf },
    /// `total` incoming files were found; `duplicates` of them were already
    /// in the library or repeat the bytes of an earlier incoming file.
    Discovered { total: u64, duplicates: u64 },
    Handled(Box<ImportAction>),
    Failed { path: Option<PathBuf>, error: ImportError },
    /// Directories the import left empty in the source were removed.
    CleanedUp(Vec<PathBuf>),
    Complete(ImportSummary),
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
#[display("{imported} imported, {disambiguated} disambiguated, {skipped} skipped, {deleted} deleted, {failed} failed")]
pub struct ImportSummary {
    pub imported: u64,
    pub disambiguated: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl ImportSummary {
    fn record(&mut self, action: &ImportAction) {
        match action {
            ImportAction::Imported { relocation: Relocation::Disambiguated { .. }, .. } => self.disambiguated += 1,
            ImportAction::Imported { .. } => self.imported += 1,
            ImportAction::Skipped { .. } => self.skipped += 1,
            ImportAction::Deleted { .. } => self.deleted += 1,
        }
    }
}

/// Streams [`ImportEvent`]s while every file below `source` is brought into
/// the library.
///
/// 1. The source is walked and every file checksummed, up to
///    [`Context::concurrency`] at a time. Files whose bytes the library
///    already has are handed to `policy` straight away, without calling the
///    providers. A file repeating the bytes of an earlier incoming file is
///    held back until that file has been placed.
/// 2. The remaining files go through the providers, and are then relocated
///    and recorded one at a time, in walk order. Once a file is placed, its
///    held-back copies go to `policy` as duplicates of the placed file; if
///    it could not be placed, the first held-back copy is imported instead.
/// 3. When files were moved or deleted out of `source`, directories that left
///    empty are removed. `source` itself always stays.
///
/// A `source` that does not exist, lies inside the library or contains it is
/// rejected before anything is touched. With a dry-run [`Organizer`] the
/// events describe what would happen, and neither the source, the library
/// nor the cache change.
pub fn import<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    organizer: &'a Organizer,
    source: impl AsRef<Path>,
    mode: Transfer,
    policy: DuplicatePolicy,
) -> impl Stream<Item = LibraryResult<ImportEvent>> + 'a {
    let source = source.as_ref().to_path_buf();
    stream! {
        for await event in import_inner(cache, ctx, organizer, source, mode, policy) {
            yield event.or_raise(|| LibraryErrorKind::Import);
        }
    }
}

/// Normalize the import source and make sure it does not overlap the library.
async fn check_source(source: &Path, library: &Path) -> ImportResult<PathBuf> {
    let source = normalize_path(source).or_raise(|| ErrorKind::Source)?;
    let metadata = tokio::fs::metadata(&source).await.or_raise(|| ErrorKind::Source)?;
    exn::ensure!(metadata.is_dir() || metadata.is_file(), ErrorKind::Source);
    let overlaps = source == library || is_child(library, &source) || is_child(&source, library);
    exn::ensure!(!overlaps, ErrorKind::Source);
    Ok(source)
}

fn import_inner<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    organizer: &'a Organizer,
    source: PathBuf,
    mode: Transfer,
    policy: DuplicatePolicy,
) -> impl Stream<Item = ImportResult<ImportEvent>> + 'a {
    stream!({
        let library = organizer.root();
        let checked = match organizer.check_root().await {
            Ok(()) => check_source(&source, library).await,
            Err(err) => Err(err.raise(ErrorKind::Root)),
        };
        let source = match checked {
            Ok(source) => source,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        yield Ok(ImportEvent::Started { source: source.clone(), library: library.to_path_buf() });
        let mut summary = ImportSummary::default();

        // Bytes of a file queued for placement, and later files with the same
        // bytes held back until it is placed.
        let mut queued: HashSet<(String, u64)> = HashSet::new();
        let mut held: HashMap<(String, u64), VecDeque<FileStat>> = HashMap::new();
        let mut queue = Vec::new();
        let mut total = 0;
        let mut duplicates = 0;
        let walker = ctx.walker(&source);
        let fingerprints = walker
            .walk()
            .map(|entry| async move {
                match entry {
                    Ok(stat) => {
                        let path = stat.path.clone();
                        (Some(path), fingerprint(stat).await)
                    },
                    Err(err) => (err.path().map(Path::to_path_buf), Err(err.raise(ErrorKind::Storage))),
                }
            })
            .buffered(ctx.concurrency);
        for await (path, fingerprinted) in fingerprints {
            let (stat, checksum) = match fingerprinted {
                Ok(fingerprinted) => fingerprinted,
                Err(err) => {
                    summary.failed += 1;
                    yield Ok(failed(path, err));
                    continue;
                },
            };
            total += 1;
            let key = (checksum, stat.size);
            if queued.contains(&key) {
                duplicates += 1;
                held.entry(key).or_default().push_back(stat);
                continue;
            }
            let duplicate_of = match known_copy(cache, &key.0, stat.size).await {
                Ok(duplicate_of) => duplicate_of,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            let Some(duplicate_of) = duplicate_of else {
                queued.insert(key.clone());
                queue.push((stat, key.0));
                continue;
            };
            duplicates += 1;
            match apply_policy(ctx, organizer, policy, stat.path.clone(), duplicate_of).await {
                Ok(Some(action)) => {
                    summary.record(&action);
                    yield Ok(ImportEvent::Handled(Box::new(action)));
                },
                Ok(None) => queue.push((stat, key.0)),
                Err(err) => {
                    summary.failed += 1;
                    yield Ok(failed(Some(stat.path), err));
                },
            }
        }
        yield Ok(ImportEvent::Discovered { total, duplicates });

        let described = futures::stream::iter(queue)
            .map(|(stat, checksum)| async move {
                let path = stat.path.clone();
                let key = (checksum.clone(), stat.size);
                (path, key, describe(ctx, stat, checksum).await.or_raise(|| ErrorKind::Scan))
            })
            .buffered(ctx.concurrency);
        for await (path, key, described) in described {
            let mut path = path;
            let mut outcome = match described {
                Ok(record) => place(cache, organizer, record, mode).await,
                Err(err) => Err(err),
            };
            // A held-back copy takes the place of a first copy that failed.
            let placed = loop {
                match outcome {
                    Ok(action) => {
                        let placed = match &action {
                            ImportAction::Imported { relocation, .. } => Some(relocation.path().to_path_buf()),
                            _ => None,
                        };
                        summary.record(&action);
                        yield Ok(ImportEvent::Handled(Box::new(action)));
                        break placed;
                    },
                    Err(err) if err.is_fatal() => {
                        yield Err(err);
                        return;
                    },
                    Err(err) => {
                        summary.failed += 1;
                        yield Ok(failed(Some(path), err));
                        let Some(next) = held.get_mut(&key).and_then(VecDeque::pop_front) else {
                            break None;
                        };
                        path = next.path.clone();
                        outcome = admit(cache, ctx, organizer, next, key.0.clone(), mode).await;
                    },
                }
            };
            let (Some(first), Some(copies)) = (placed, held.remove(&key)) else {
                continue;
            };
            for stat in copies {
                let path = stat.path.clone();
                let handled = match apply_policy(ctx, organizer, policy, path.clone(), first.clone()).await {
                    Ok(Some(action)) => Ok(action),
                    Ok(None) => admit(cache, ctx, organizer, stat, key.0.clone(), mode).await,
                    Err(err) => Err(err),
                };
                match handled {
                    Ok(action) => {
                        summary.record(&action);
                        yield Ok(ImportEvent::Handled(Box::new(action)));
                    },
                    Err(err) if err.is_fatal() => {
                        yield Err(err);
                        return;
                    },
                    Err(err) => {
                        summary.failed += 1;
                        yield Ok(failed(Some(path), err));
                    },
                }
            }
        }

        let emptied = !organizer.is_dry_run()
            && (mode == Transfer::Move || (policy == DuplicatePolicy::Delete && summary.deleted > 0));
        let is_dir = tokio::fs::metadata(&source).await.is_ok_and(|metadata| metadata.is_dir());
        let removed = match emptied && is_dir {
            true => remove_empty_dirs(&source).await.unwrap_or_else(|err| {
                warn!(source = %source.display(), error = %err, "cannot remove empty directories");
                Vec::new()
            }),
            false => Vec::new(),
        };
        yield Ok(ImportEvent::CleanedUp(removed));
        info!(source = %source.display(), %summary, "import complete");
        yield Ok(ImportEvent::Complete(summary));
    })
}

/// Describe and place a file that skipped the concurrent pass.
async fn admit(
    cache: &Repository,
    ctx: &Context,
    organizer: &Organizer,
    stat: FileStat,
    checksum: String,
    mode: Transfer,
) -> ImportResult<ImportAction> {
    let record = describe(ctx, stat, checksum).await.or_raise(|| ErrorKind::Scan)?;
    place(cache, organizer, record, mode).await
}

fn failed(path: Option<PathBuf>, error: ImportError) -> ImportEvent {
    match &path {
        Some(path) => warn!(path = %path.display(), error = %error, "cannot import file"),
        None => warn!(error = %error, "cannot import file"),
    }
    ImportEvent::Failed { path, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hierarchy;
    use crate::testing::{Fixture, collect, photo, video};
    use futures::TryStreamExt;

    async fn organizer(fx: &Fixture) -> Organizer {
        std::fs::create_dir_all(fx.path("lib")).unwrap();
        Organizer::new(fx.path("lib"), Hierarchy::default()).await.unwrap()
    }

    fn summary(events: &[ImportEvent]) -> ImportSummary {
        match events.last() {
            Some(ImportEvent::Complete(summary)) => *summary,
            other => panic!("stream did not complete: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_import_directory() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("card/DCIM/100/a.jpg", b"a");
        fx.write("card/DCIM/100/b.mov", b"b");
        fx.write("card/DCIM/101/broken.jpg", b"?");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        fx.metadata.set("b.mov", video("2019:01:02 10:00:00"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Move, DuplicatePolicy::Skip)).await;
        assert!(matches!(events[0], ImportEvent::Started { .. }));
        assert_eq!(summary(&events), ImportSummary { imported: 2, failed: 1, ..ImportSummary::default() });
        assert!(fx.path("lib/2018/10/21/a.jpg").exists());
        assert!(fx.path("lib/2019/01/02/b.mov").exists());
        assert!(fx.path("card/DCIM/101/broken.jpg").exists());
        assert!(!fx.path("card/DCIM/100").exists());
        assert!(fx.path("card").exists());
        assert_eq!(fx.cache.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reimport_skips_everything() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("card/a.jpg", b"a");
        fx.write("card/b.jpg", b"b");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        fx.metadata.set("b.jpg", photo("2018:10:22 14:03:22"));
        let card = fx.path("card");

        collect(import(&fx.cache, &fx.ctx, &organizer, &card, Transfer::Copy, DuplicatePolicy::Skip)).await;
        let calls = fx.metadata.calls();
        let events = collect(import(&fx.cache, &fx.ctx, &organizer, &card, Transfer::Copy, DuplicatePolicy::Skip)).await;
        assert!(events.iter().any(|event| matches!(event, ImportEvent::Discovered { total: 2, duplicates: 2 })));
        assert_eq!(summary(&events), ImportSummary { skipped: 2, ..ImportSummary::default() });
        assert_eq!(fx.metadata.calls(), calls);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_import() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("card/a.jpg", b"same");
        fx.write("card/backup/a.jpg", b"same");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Copy, DuplicatePolicy::Skip)).await;
        assert_eq!(summary(&events), ImportSummary { imported: 1, skipped: 1, ..ImportSummary::default() });
        let skipped = events.iter().find_map(|event| match event {
            ImportEvent::Handled(action) => match action.as_ref() {
                ImportAction::Skipped { duplicate_of, .. } => Some(duplicate_of.clone()),
                _ => None,
            },
            _ => None,
        });
        assert_eq!(skipped, Some(fx.path("lib/2018/10/21/a.jpg")));
    }

    #[tokio::test]
    async fn test_copy_stands_in_for_failed_first_copy() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("card/a.jpg", b"same");
        fx.write("card/b.jpg", b"same");
        fx.metadata.set("a.jpg", photo("not a date"));
        fx.metadata.set("b.jpg", photo("2018:10:21 14:03:22"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Copy, DuplicatePolicy::Delete))
                .await;
        assert_eq!(summary(&events), ImportSummary { imported: 1, failed: 1, ..ImportSummary::default() });
        assert!(fx.path("card/a.jpg").exists());
        assert!(fx.path("card/b.jpg").exists());
        assert!(fx.path("lib/2018/10/21/b.jpg").exists());
        assert!(fx.cache.get(fx.path("lib/2018/10/21/b.jpg")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_copies_wait_for_their_first_copy() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("card/a.jpg", b"same");
        fx.write("card/b.jpg", b"same");
        fx.write("card/c.jpg", b"same");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Copy, DuplicatePolicy::Delete))
                .await;
        assert!(events.iter().any(|event| matches!(event, ImportEvent::Discovered { total: 3, duplicates: 2 })));
        assert_eq!(summary(&events), ImportSummary { imported: 1, deleted: 2, ..ImportSummary::default() });
        assert!(fx.path("lib/2018/10/21/a.jpg").exists());
        assert!(!fx.path("card/b.jpg").exists());
        assert!(!fx.path("card/c.jpg").exists());
        // Only the first copy ever reached the providers.
        assert_eq!(fx.metadata.calls(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let fx = Fixture::new().await;
        std::fs::create_dir_all(fx.path("lib")).unwrap();
        let organizer = Organizer::new(fx.path("lib"), Hierarchy::default()).await.unwrap().with_dry_run(true);
        fx.write("card/DCIM/a.jpg", b"a");
        fx.write("card/DCIM/copy.jpg", b"a");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Move, DuplicatePolicy::Delete))
                .await;
        assert_eq!(summary(&events), ImportSummary { imported: 1, deleted: 1, ..ImportSummary::default() });
        let planned = events.iter().find_map(|event| match event {
            ImportEvent::Handled(action) => match action.as_ref() {
                ImportAction::Imported { relocation, .. } => Some(relocation.clone()),
                _ => None,
            },
            _ => None,
        });
        assert_eq!(planned, Some(Relocation::Relocated(fx.path("lib/2018/10/21/a.jpg"))));
        assert!(fx.path("card/DCIM/a.jpg").exists());
        assert!(fx.path("card/DCIM/copy.jpg").exists());
        assert!(!fx.path("lib/2018").exists());
        assert_eq!(fx.cache.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_name_different_bytes() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("lib/2018/10/21/a.jpg", b"first");
        fx.write("card/a.jpg", b"second");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        let events =
            collect(import(&fx.cache, &fx.ctx, &organizer, fx.path("card"), Transfer::Copy, DuplicatePolicy::Skip)).await;
        assert_eq!(summary(&events), ImportSummary { disambiguated: 1, ..ImportSummary::default() });
        assert_eq!(std::fs::read(fx.path("lib/2018/10/21/a.jpg")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_overlapping_source_is_fatal() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("lib/incoming/a.jpg", b"a");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));

        for source in [fx.path("lib/incoming"), fx.path("lib"), fx.root().to_path_buf(), fx.path("missing")] {
            let result: LibraryResult<Vec<ImportEvent>> =
                import(&fx.cache, &fx.ctx, &organizer, &source, Transfer::Move, DuplicatePolicy::Skip)
                    .try_collect()
                    .await;
            assert!(result.is_err(), "{} was accepted", source.display());
        }
        assert!(fx.path("lib/incoming/a.jpg").exists());
        assert_eq!(fx.metadata.calls(), 0);
    }
}
