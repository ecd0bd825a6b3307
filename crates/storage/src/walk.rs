//! Deterministic recursive file enumeration.
//!
//! Entries of each directory are sorted before they are visited, and a
//! directory is descended into at the position its name sorts to. The
//! resulting order is the same on every run, regardless of what order the
//! filesystem hands entries back in.

use async_stream::stream;
use futures::Stream;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

use crate::error::{ErrorKind, Result};
use crate::file::FileStat;

/// Name of the thumbnail cache directory Synology DSM creates everywhere.
pub const SYNOLOGY_THUMBNAILS: &str = "@eaDir";

enum WalkEntry {
    File(FileStat),
    Descend(VecDeque<PathBuf>),
    Skip,
}

/// Lazily walks a directory tree, yielding every plain file below it.
#[derive(Debug, Clone)]
pub struct PathWalker {
    root: PathBuf,
    skip_dirs: Vec<OsString>,
    skip_paths: Vec<PathBuf>,
}

impl PathWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), skip_dirs: vec![OsString::from(SYNOLOGY_THUMBNAILS)], skip_paths: Vec::new() }
    }

    /// Replace the set of directory names that are never descended into.
    pub fn skip_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.skip_dirs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Never descend into these directories, wherever they sort. Relative
    /// paths are resolved against the working directory; paths that cannot
    /// be normalized are ignored.
    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.skip_paths.extend(paths.into_iter().filter_map(|path| crate::path::normalize(path).ok()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_skipped(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| self.skip_dirs.iter().any(|skip| skip == name))
            || self.skip_paths.iter().any(|skip| skip == path)
    }

    /// Stream every plain file below the root in depth-first, lexicographic
    /// order.
    ///
    /// A root that is itself a file yields just that file. Errors for a single
    /// entry (permission denied on a subdirectory, a file vanishing mid-walk)
    /// are yielded in place and the walk carries on with the next entry; only
    /// an unreadable root ends the stream early.
    pub fn walk(&self) -> impl Stream<Item = Result<FileStat>> + Send + '_ {
        stream! {
            let root = match crate::path::normalize(&self.root) {
                Ok(root) => root,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            let mut stack = match self.process(root, true).await {
                Ok(WalkEntry::File(stat)) => {
                    yield Ok(stat);
                    return;
                },
                Ok(WalkEntry::Descend(entries)) => vec![entries],
                Ok(WalkEntry::Skip) => return,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };

            while let Some(entries) = stack.last_mut() {
                let Some(path) = entries.pop_front() else {
                    stack.pop();
                    continue;
                };
                match self.process(path, false).await {
                    Ok(WalkEntry::File(stat)) => yield Ok(stat),
                    Ok(WalkEntry::Descend(children)) => stack.push(children),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => yield Err(err),
                }
            }
        }
    }

    /// Stat a single path and decide what the walk does with it. Kept out of
    /// the stream body so `?` can be used.
    async fn process(&self, path: PathBuf, is_root: bool) -> Result<WalkEntry> {
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Dangling symlink, or the file was removed after it was listed.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !is_root => {
                debug!(path = %path.display(), "skipping dangling entry");
                return Ok(WalkEntry::Skip);
            },
            Err(err) => exn::bail!(ErrorKind::from_io(err, &path)),
        };
        if metadata.is_dir() {
            if !is_root && self.is_skipped(&path) {
                trace!(path = %path.display(), "skipping directory");
                return Ok(WalkEntry::Skip);
            }
            return Ok(WalkEntry::Descend(read_sorted(&path).await?));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(FileStat::from_metadata(path, &metadata)));
        }
        // Sockets, FIFOs and device nodes are never media.
        Ok(WalkEntry::Skip)
    }
}

async fn read_sorted(dir: &Path) -> Result<VecDeque<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| ErrorKind::from_io(e, dir))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| ErrorKind::from_io(e, dir))? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, relative.as_bytes()).unwrap();
    }

    async fn collect(walker: &PathWalker) -> Vec<PathBuf> {
        let root = walker.root().to_path_buf();
        walker
            .walk()
            .map(|stat| stat.unwrap().path.strip_prefix(&root).unwrap().to_path_buf())
            .collect()
            .await
    }

    fn library() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in ["b.jpg", "a/2.jpg", "a/1.jpg", "c/d/e.mov", "a.jpg", "@eaDir/thumb.jpg", "c/@eaDir/x.jpg"] {
            touch(dir.path(), file);
        }
        dir
    }

    #[tokio::test]
    async fn test_walk_is_sorted_depth_first() {
        let dir = library();
        let walker = PathWalker::new(dir.path());
        let found = collect(&walker).await;
        let expected: Vec<PathBuf> =
            ["a/1.jpg", "a/2.jpg", "a.jpg", "b.jpg", "c/d/e.mov"].into_iter().map(PathBuf::from).collect();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_walk_is_repeatable() {
        let dir = library();
        let walker = PathWalker::new(dir.path());
        assert_eq!(collect(&walker).await, collect(&walker).await);
    }

    #[tokio::test]
    async fn test_custom_skip_list() {
        let dir = library();
        let walker = PathWalker::new(dir.path()).skip_dirs(["a", "d"]);
        let found = collect(&walker).await;
        assert!(found.contains(&PathBuf::from("@eaDir/thumb.jpg")));
        assert!(!found.iter().any(|path| path.starts_with("a")));
        assert!(!found.contains(&PathBuf::from("c/d/e.mov")));
    }

    #[tokio::test]
    async fn test_skip_paths() {
        let dir = library();
        touch(dir.path(), "trash/old.jpg");
        touch(dir.path(), "c/trash/kept.jpg");
        let walker = PathWalker::new(dir.path()).skip_paths([dir.path().join("trash")]);
        let found = collect(&walker).await;
        assert!(!found.contains(&PathBuf::from("trash/old.jpg")));
        // Only that directory, not everything with the same name.
        assert!(found.contains(&PathBuf::from("c/trash/kept.jpg")));
    }

    #[tokio::test]
    async fn test_single_file_root() {
        let dir = library();
        let walker = PathWalker::new(dir.path().join("b.jpg"));
        let found: Vec<_> = walker.walk().map(|stat| stat.unwrap().path).collect().await;
        assert_eq!(found, vec![dir.path().join("b.jpg")]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let walker = PathWalker::new(dir.path().join("missing"));
        let found: Vec<_> = walker.walk().collect().await;
        assert_eq!(found.len(), 1);
        let err = found[0].as_ref().unwrap_err();
        assert!(matches!(&**err, ErrorKind::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_skipped() {
        let dir = library();
        std::os::unix::fs::symlink(dir.path().join("nowhere.jpg"), dir.path().join("link.jpg")).unwrap();
        let walker = PathWalker::new(dir.path());
        let found = collect(&walker).await;
        assert_eq!(found.len(), 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_does_not_abort() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for file in ["a/1.jpg", "b/secret.jpg", "c/2.jpg"] {
            touch(dir.path(), file);
        }
        let locked = dir.path().join("b");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Permission bits mean nothing to root.
        if std::fs::read_dir(&locked).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let walker = PathWalker::new(dir.path());
        let found: Vec<_> = walker.walk().collect().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let errors: Vec<_> = found.iter().filter_map(|entry| entry.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&**errors[0], ErrorKind::PermissionDenied(_)));
        let files: Vec<PathBuf> = found
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|stat| stat.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(files, [PathBuf::from("a/1.jpg"), PathBuf::from("c/2.jpg")]);
    }
}
