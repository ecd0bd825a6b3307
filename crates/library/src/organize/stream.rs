use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use shashin_cache::Repository;
use shashin_storage::transfer::remove_empty_dirs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::organize::error::{Error as OrganizeError, ErrorKind, Result as OrganizeResult};
use crate::organize::file::{Organized, settle};
use crate::organize::{Organizer, Relocation};
use crate::prune::prune_missing;
use crate::scan::{Lookup, extract, lookup};

/// Progress events emitted by [`organize`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Pruned`](Self::Pruned): exactly once, before any file is touched.
/// 3. [`Discovered`](Self::Discovered): exactly once.
/// 4. [`Organized`](Self::Organized) / [`Failed`](Self::Failed): one per
///    file (walk failures may appear before `Discovered`).
/// 5. [`CleanedUp`](Self::CleanedUp): exactly once.
/// 6. [`Complete`](Self::Complete): exactly once.
///
/// A fatal error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum OrganizeEvent {
    Started { root: PathBuf },
    /// Records whose files no longer exist were removed.
    Pruned(Vec<PathBuf>),
    /// `total` files were found in the library; `stale` of them need a scan.
    Discovered { total: u64, stale: u64 },
    Organized(Box<Organized>),
    Failed { path: Option<PathBuf>, error: OrganizeError },
    /// Directories left empty were removed, deepest first.
    CleanedUp(Vec<PathBuf>),
    Complete(OrganizeSummary),
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
#[display(
    "{relocated} moved, {disambiguated} disambiguated, {in_place} in place, {failed} failed, {pruned} pruned, {removed_dirs} empty directories removed"
)]
pub struct OrganizeSummary {
    pub in_place: u64,
    pub relocated: u64,
    pub disambiguated: u64,
    pub failed: u64,
    pub pruned: u64,
    pub removed_dirs: u64,
}

impl OrganizeSummary {
    fn record(&mut self, relocation: &Relocation) {
        match relocation {
            Relocation::AlreadyInPlace(_) => self.in_place += 1,
            Relocation::Relocated(_) => self.relocated += 1,
            Relocation::Disambiguated { .. } => self.disambiguated += 1,
        }
    }
}

/// Streams [`OrganizeEvent`]s while every file in the library is moved to
/// where its metadata says it belongs.
///
/// 1. Records of vanished files are pruned, so nothing that follows races
///    the prune.
/// 2. The library is walked in full before anything moves, so no file is
///    seen twice. Fresh records are trusted; stale files are queued for a
///    scan.
/// 3. Stale files go through the providers up to [`Context::concurrency`] at
///    a time. Every file (in walk order) is then relocated and its record
///    replaced, one at a time.
/// 4. Directories left empty are removed. The root always stays.
///
/// On an organized library this touches nothing at all. With a dry-run
/// [`Organizer`] the events report the planned relocations and only the
/// cache is written to.
pub fn organize<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    organizer: &'a Organizer,
) -> impl Stream<Item = LibraryResult<OrganizeEvent>> + 'a {
    stream! {
        for await event in organize_inner(cache, ctx, organizer) {
            yield event.or_raise(|| LibraryErrorKind::Organize);
        }
    }
}

fn organize_inner<'a>(
    cache: &'a Repository,
    ctx: &'a Context,
    organizer: &'a Organizer,
) -> impl Stream<Item = OrganizeResult<OrganizeEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let root = organizer.root();
        if let Err(err) = organizer.check_root().await {
            yield Err(err);
            return;
        }
        yield Ok(OrganizeEvent::Started { root: root.to_path_buf() });
        let mut summary = OrganizeSummary::default();

        match prune_missing(cache, root).await.or_raise(|| ErrorKind::Cache) {
            Ok(pruned) => {
                summary.pruned = pruned.len() as u64;
                yield Ok(OrganizeEvent::Pruned(pruned));
            },
            Err(err) => {
                yield Err(err);
                return;
            },
        }

        let mut pending = Vec::new();
        let mut stale = 0;
        let walker = ctx.walker(root);
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
            match lookup(cache, stat).await.or_raise(|| ErrorKind::Cache) {
                Ok(found) => {
                    stale += u64::from(matches!(found, Lookup::Stale(_)));
                    pending.push(found);
                },
                Err(err) => {
                    yield Err(err);
                    return;
                },
            }
        }
        yield Ok(OrganizeEvent::Discovered { total: pending.len() as u64, stale });

        let ready = futures::stream::iter(pending)
            .map(|found| async move {
                match found {
                    Lookup::Fresh(record) => (record.path.clone(), Ok((record, true))),
                    Lookup::Stale(stat) => {
                        let path = stat.path.clone();
                        (path, extract(ctx, stat).await.or_raise(|| ErrorKind::Scan).map(|record| (record, false)))
                    },
                }
            })
            .buffered(ctx.concurrency);
        for await (path, ready) in ready {
            let settled = match ready {
                Ok((record, fresh)) => settle(cache, organizer, record, fresh).await,
                Err(err) => Err(err),
            };
            match settled {
                Ok(organized) => {
                    summary.record(&organized.relocation);
                    yield Ok(OrganizeEvent::Organized(Box::new(organized)));
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

        let cleaned = match organizer.is_dry_run() {
            true => Ok(Vec::new()),
            false => remove_empty_dirs(root).await,
        };
        match cleaned {
            Ok(removed) => {
                summary.removed_dirs = removed.len() as u64;
                yield Ok(OrganizeEvent::CleanedUp(removed));
            },
            Err(err) => {
                // Leftover empty directories are harmless.
                let path = err.path().map(Path::to_path_buf);
                summary.failed += 1;
                yield Ok(failed(path, err.raise(ErrorKind::Storage)));
                yield Ok(OrganizeEvent::CleanedUp(Vec::new()));
            },
        }
        info!(root = %root.display(), %summary, "organize complete");
        yield Ok(OrganizeEvent::Complete(summary));
    })
}

fn failed(path: Option<PathBuf>, error: OrganizeError) -> OrganizeEvent {
    match &path {
        Some(path) => warn!(path = %path.display(), error = %error, "cannot organize file"),
        None => warn!(error = %error, "cannot organize file"),
    }
    OrganizeEvent::Failed { path, error }
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

    fn summary(events: &[OrganizeEvent]) -> OrganizeSummary {
        match events.last() {
            Some(OrganizeEvent::Complete(summary)) => *summary,
            other => panic!("stream did not complete: {other:?}"),
        }
    }

    /// Every file below `root`, relative to it.
    fn layout(root: &Path) -> Vec<PathBuf> {
        fn visit(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    visit(&path, root, out);
                } else {
                    out.push(path.strip_prefix(root).unwrap().to_path_buf());
                }
            }
        }
        let mut out = Vec::new();
        visit(root, root, &mut out);
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_organizes_library() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("lib/Camera Roll/a.jpg", b"a");
        fx.write("lib/b.mov", b"b");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        fx.metadata.set("b.mov", video("2019:01:02 10:00:00"));

        let events = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        assert!(matches!(events[0], OrganizeEvent::Started { .. }));
        assert!(matches!(events[1], OrganizeEvent::Pruned(_)));
        assert!(matches!(events[2], OrganizeEvent::Discovered { total: 2, stale: 2 }));
        assert_eq!(layout(organizer.root()), [PathBuf::from("2018/10/21/a.jpg"), PathBuf::from("2019/01/02/b.mov")]);
        assert!(!fx.path("lib/Camera Roll").exists());
        assert_eq!(summary(&events).relocated, 2);
        assert_eq!(summary(&events).removed_dirs, 1);
        assert_eq!(fx.cache.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_reports_plan_only() {
        let fx = Fixture::new().await;
        std::fs::create_dir_all(fx.path("lib")).unwrap();
        let organizer = Organizer::new(fx.path("lib"), Hierarchy::default()).await.unwrap().with_dry_run(true);
        fx.write("lib/Camera Roll/a.jpg", b"a");
        fx.write("lib/2018/10/21/b.jpg", b"b");
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        fx.metadata.set("b.jpg", photo("2018:10:21 15:00:00"));
        let before = layout(organizer.root());

        let events = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        let planned: Vec<(PathBuf, Relocation)> = events
            .iter()
            .filter_map(|event| match event {
                OrganizeEvent::Organized(organized) => Some((organized.from.clone(), organized.relocation.clone())),
                _ => None,
            })
            .collect();
        assert!(planned.contains(&(
            fx.path("lib/Camera Roll/a.jpg"),
            Relocation::Relocated(fx.path("lib/2018/10/21/a.jpg"))
        )));
        assert_eq!(layout(organizer.root()), before);
        assert!(events.iter().any(|event| matches!(event, OrganizeEvent::CleanedUp(removed) if removed.is_empty())));
        assert_eq!(summary(&events), OrganizeSummary { relocated: 1, in_place: 1, ..OrganizeSummary::default() });
        // Scans are still remembered, under the files' current paths.
        assert!(fx.cache.get(fx.path("lib/Camera Roll/a.jpg")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_run_touches_nothing() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        for (dir, name) in [("x", "a.jpg"), ("y", "b.jpg"), ("z", "a.jpg")] {
            fx.write(format!("lib/{dir}/{name}"), format!("{dir}{name}").as_bytes());
        }
        fx.metadata.set("a.jpg", photo("2018:10:21 14:03:22"));
        fx.metadata.set("b.jpg", photo("2018:10:21 15:00:00"));

        let first = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        assert_eq!(summary(&first).relocated, 2);
        assert_eq!(summary(&first).disambiguated, 1);
        let before = layout(organizer.root());
        let calls = fx.metadata.calls();

        let second = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        assert_eq!(
            summary(&second),
            OrganizeSummary { in_place: 3, ..OrganizeSummary::default() }
        );
        assert_eq!(layout(organizer.root()), before);
        assert_eq!(fx.metadata.calls(), calls);
    }

    #[tokio::test]
    async fn test_failures_leave_files_alone() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        fx.write("lib/undated.jpg", b"u");
        fx.write("lib/unknown.jpg", b"?");
        fx.write("lib/ok.jpg", b"ok");
        fx.metadata.set("undated.jpg", photo("not a date"));
        fx.metadata.set("ok.jpg", photo("2018:10:21 14:03:22"));

        let events = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        let failures: Vec<&OrganizeError> = events
            .iter()
            .filter_map(|event| match event {
                OrganizeEvent::Failed { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|err| matches!(&***err, ErrorKind::Hierarchy)));
        assert!(failures.iter().any(|err| matches!(&***err, ErrorKind::Scan)));
        assert!(fx.path("lib/undated.jpg").exists());
        assert!(fx.path("lib/unknown.jpg").exists());
        assert!(fx.path("lib/2018/10/21/ok.jpg").exists());
        assert_eq!(summary(&events).failed, 2);
    }

    #[tokio::test]
    async fn test_prunes_before_organizing() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        let gone = fx.write("lib/gone.jpg", b"g");
        fx.metadata.set("gone.jpg", photo("2018:10:21 14:03:22"));
        crate::scan::scan_file(&fx.cache, &fx.ctx, &gone).await.unwrap();
        std::fs::remove_file(&gone).unwrap();

        let events = collect(organize(&fx.cache, &fx.ctx, &organizer)).await;
        assert!(matches!(&events[1], OrganizeEvent::Pruned(paths) if paths == &[gone.clone()]));
        assert_eq!(fx.cache.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vanished_root_is_fatal() {
        let fx = Fixture::new().await;
        let organizer = organizer(&fx).await;
        std::fs::remove_dir(fx.path("lib")).unwrap();

        let result: LibraryResult<Vec<OrganizeEvent>> = organize(&fx.cache, &fx.ctx, &organizer).try_collect().await;
        assert!(matches!(&*result.unwrap_err(), LibraryErrorKind::Organize));
    }
}
