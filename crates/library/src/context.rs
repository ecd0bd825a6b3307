use shashin_extract::{HashHandle, MetadataHandle};
use shashin_storage::{PathWalker, SYNOLOGY_THUMBNAILS};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Everything a library operation needs besides the cache: the external
/// providers and the knobs that shape a batch run.
///
/// Built once per invocation and passed by reference; cloning is cheap.
#[derive(Clone)]
pub struct Context {
    pub metadata: MetadataHandle,
    pub hasher: HashHandle,
    /// Directory names never descended into.
    pub skip_dirs: Vec<OsString>,
    /// How many files may be inside the metadata/hash providers at once.
    pub concurrency: usize,
    /// Where deleted files go. Unlinked when `None`.
    pub trash: Option<PathBuf>,
}

impl Context {
    pub fn new(metadata: MetadataHandle, hasher: HashHandle) -> Self {
        Self { metadata, hasher, skip_dirs: vec![SYNOLOGY_THUMBNAILS.into()], concurrency: 1, trash: None }
    }

    pub fn with_skip_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.skip_dirs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_trash(mut self, trash: Option<PathBuf>) -> Self {
        self.trash = trash;
        self
    }

    /// Walks `root` without ever entering the skipped directories or the
    /// trash.
    pub(crate) fn walker(&self, root: impl Into<PathBuf>) -> PathWalker {
        PathWalker::new(root).skip_dirs(self.skip_dirs.iter().cloned()).skip_paths(self.trash())
    }

    pub(crate) fn trash(&self) -> Option<&Path> {
        self.trash.as_deref()
    }
}
