use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use shashin_cache::Repository;
use shashin_storage::normalize_path;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::prune::prune_missing;
use crate::scan::error::{Error as ScanError, ErrorKind, Result as ScanResult};
use crate::scan::{Lookup, Scan, ScanAction, extract, lookup, persist};

/// Progress of a [`scan`], in the order the events are emitted.
///
/// `Started` is always first and `Complete` always last; a stream that ends
/// with an `Err` instead was aborted by a fatal error.
#[derive(Debug)]
pub enum ScanEvent {
    Started { root: PathBuf },
    /// Every file below the root has been checked against the cache;
    /// `stale` of them need the providers.
    Discovered { total: u64, stale: u64 },
    Scanned(Box<Scan>),
    /// One file could not be scanned. The run carries on.
    Failed { path: Option<PathBuf>, error: ScanError },
    /// Records whose files no longer exist were removed.
    Pruned(Vec<PathBuf>),
    Complete(ScanSummary),
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
#[display("{inserted} new, {updated} changed, {skipped} unchanged, {failed} failed, {pruned} pruned")]
pub struct ScanSummary {
    pub skipped: u64,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    pub pruned: u64,
}

impl ScanSummary {
    fn record(&mut self, action: ScanAction) {
        match action {
            ScanAction::Skipped => self.skipped += 1,
            ScanAction::Inserted => self.inserted += 1,
            ScanAction::Updated => self.updated += 1,
        }
    }
}

/// Bring the cache in step with every file below `root`.
///
/// Runs in three passes that never overlap:
///
/// 1. **Discovery** walks the tree and checks each file against the cache.
///    Fresh files are reported straight away.
/// 2. **Extraction** runs the providers over the stale files, up to
///    [`Context::concurrency`] at a time, writing each record back one by one
///    in walk order.
/// 3. **Pruning** removes records below `root` whose files have vanished.
///
/// Per-file problems become [`ScanEvent::Failed`]; a cache failure or an
/// unreadable root ends the stream with an error.
pub fn scan<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    root: impl AsRef<Path>,
) -> impl Stream<Item = LibraryResult<ScanEvent>> + 'a {
    let root = root.as_ref().to_path_buf();
    stream! {
        for await event in scan_inner(cache, ctx, root) {
            yield event.or_raise(|| LibraryErrorKind::Scan);
        }
    }
}

fn scan_inner<'a>(cache: &'a Repository, ctx: &'a Context, root: PathBuf) -> impl Stream<Item = ScanResult<ScanEvent>> + 'a {
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
        yield Ok(ScanEvent::Started { root: root.clone() });
        let mut summary = ScanSummary::default();

        let mut stale = Vec::new();
        let mut total = 0;
        let walker = ctx.walker(&root);
        for await entry in walker.walk() {
            let stat = match entry {
                Ok(stat) => stat,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf);
                    summary.failed += 1;
                    yield Ok(failed(path, err.raise(ErrorKind::Storage)));
                    continue;
                },
            };
            total += 1;
            match lookup(cache, stat).await {
                Ok(Lookup::Fresh(record)) => {
                    summary.record(ScanAction::Skipped);
                    yield Ok(ScanEvent::Scanned(Box::new(Scan { record, action: ScanAction::Skipped })));
                },
                Ok(Lookup::Stale(stat)) => stale.push(stat),
                Err(err) => {
                    yield Err(err);
                    return;
                },
            }
        }
        yield Ok(ScanEvent::Discovered { total, stale: stale.len() as u64 });

        // Only the providers run concurrently; every cache write happens
        // here, one at a time.
        let extracted = futures::stream::iter(stale)
            .map(|stat| async move {
                let path = stat.path.clone();
                (path, extract(ctx, stat).await)
            })
            .buffered(ctx.concurrency);
        for await (path, extracted) in extracted {
            let record = match extracted {
                Ok(record) => record,
                Err(err) => {
                    summary.failed += 1;
                    yield Ok(failed(Some(path), err));
                    continue;
                },
            };
            match persist(cache, record).await {
                Ok(scan) => {
                    summary.record(scan.action);
                    yield Ok(ScanEvent::Scanned(Box::new(scan)));
                },
                Err(err) => {
                    yield Err(err);
                    return;
                },
            }
        }

        match prune_missing(cache, &root).await.or_raise(|| ErrorKind::Cache) {
            Ok(pruned) => {
                summary.pruned = pruned.len() as u64;
                yield Ok(ScanEvent::Pruned(pruned));
            },
            Err(err) => {
                yield Err(err);
                return;
            },
        }
        info!(root = %root.display(), %summary, "scan complete");
        yield Ok(ScanEvent::Complete(summary));
    })
}

fn failed(path: Option<PathBuf>, error: ScanError) -> ScanEvent {
    match &path {
        Some(path) => warn!(path = %path.display(), error = %error, "cannot scan file"),
        None => warn!(error = %error, "cannot scan file"),
    }
    ScanEvent::Failed { path, error }
}
