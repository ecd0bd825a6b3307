use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use shashin_cache::Repository;
use shashin_extract::MetadataWriter;
use shashin_extract::consts::DATE_TIME_ORIGINAL;
use shashin_storage::normalize_path;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Context;
use crate::dates::error::{Error as DatesError, ErrorKind, Result as DatesResult};
use crate::dates::file::{DateFix, fix_date_inner};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};

/// Progress of [`fix_dates`].
///
/// `Started` comes first, then `Discovered`, one `Fixed` or `Failed` per
/// candidate, and `Complete` last. A stream ending in `Err` was aborted.
#[derive(Debug)]
pub enum FixDatesEvent {
    Started { root: PathBuf },
    /// This many cached photos below the root have no capture date.
    Discovered { candidates: u64 },
    Fixed { path: PathBuf, fix: Box<DateFix> },
    Failed { path: PathBuf, error: DatesError },
    Complete(FixDatesSummary),
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
#[display("{written} dated, {already_dated} already dated, {failed} failed")]
pub struct FixDatesSummary {
    pub written: u64,
    pub already_dated: u64,
    pub failed: u64,
}

/// Give every cached photo below `root` that lacks a `DateTimeOriginal` one
/// copied from its `FileModifyDate`, one file at a time.
///
/// Candidates come from the cache, so run a [`scan`](crate::scan::scan)
/// first. Videos and other non-images are never touched.
pub fn fix_dates<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    writer: &'a dyn MetadataWriter,
    root: impl AsRef<Path>,
) -> impl Stream<Item = LibraryResult<FixDatesEvent>> + 'a {
    let root = root.as_ref().to_path_buf();
    stream! {
        for await event in fix_dates_inner(cache, ctx, writer, root) {
            yield event.or_raise(|| LibraryErrorKind::FixDates);
        }
    }
}

/// Cached photos below `root` without a capture date, in path order.
async fn candidates(cache: &Repository, root: &Path) -> DatesResult<Vec<PathBuf>> {
    cache
        .list()
        .try_filter_map(|record| {
            let undated = record.path.starts_with(root)
                && record.metadata.is_image()
                && record.metadata.date(DATE_TIME_ORIGINAL).is_none();
            futures::future::ready(Ok(undated.then_some(record.path)))
        })
        .try_collect()
        .await
        .or_raise(|| ErrorKind::Cache)
}

fn fix_dates_inner<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    writer: &'a dyn MetadataWriter,
    root: PathBuf,
) -> impl Stream<Item = DatesResult<FixDatesEvent>> + 'a {
    stream!({
        let root = match normalize_path(&root).or_raise(|| ErrorKind::Root) {
            Ok(root) => root,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        if let Err(err) = tokio::fs::metadata(&root).await.or_raise(|| ErrorKind::Root) {
            yield Err(err);
            return;
        }
        yield Ok(FixDatesEvent::Started { root: root.clone() });
        let mut summary = FixDatesSummary::default();

        let paths = match candidates(cache, &root).await {
            Ok(paths) => paths,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        yield Ok(FixDatesEvent::Discovered { candidates: paths.len() as u64 });

        for path in paths {
            match fix_date_inner(cache, ctx, writer, &path).await {
                Ok(fix) => {
                    match &fix {
                        DateFix::Written { .. } => summary.written += 1,
                        DateFix::AlreadyDated(_) => summary.already_dated += 1,
                    }
                    yield Ok(FixDatesEvent::Fixed { path, fix: Box::new(fix) });
                },
                Err(err) if err.is_fatal() => {
                    yield Err(err);
                    return;
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot fix capture date");
                    summary.failed += 1;
                    yield Ok(FixDatesEvent::Failed { path, error: err });
                },
            }
        }
        info!(root = %root.display(), %summary, "date fix complete");
        yield Ok(FixDatesEvent::Complete(summary));
    })
}
