//! Shared fixtures for the library's tests.

use futures::{Stream, StreamExt};
use shashin_cache::{Database, Repository};
use shashin_extract::Metadata;
use shashin_extract::consts::{DATE_TIME_ORIGINAL, FILE_MODIFY_DATE, MIME_TYPE};
use shashin_extract::mock::{MockHashProvider, MockMetadataProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::Context;
use crate::error::Result;

pub(crate) struct Fixture {
    pub dir: TempDir,
    /// Keeps the in-memory database alive for as long as the fixture.
    _db: Database,
    pub cache: Repository,
    pub metadata: Arc<MockMetadataProvider>,
    pub hasher: Arc<MockHashProvider>,
    pub ctx: Context,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_hasher(MockHashProvider::new()).await
    }

    pub async fn with_hasher(hasher: MockHashProvider) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        let metadata = Arc::new(MockMetadataProvider::new());
        let hasher = Arc::new(hasher);
        let ctx = Context::new(metadata.clone(), hasher.clone());
        let cache = Repository::from(&db);
        Self { dir: tempfile::tempdir().unwrap(), _db: db, cache, metadata, hasher, ctx }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating its parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// Metadata of a JPEG taken at `taken`.
pub(crate) fn photo(taken: &str) -> Metadata {
    Metadata::new().with(MIME_TYPE, "image/jpeg").with(DATE_TIME_ORIGINAL, taken)
}

/// Metadata of a video that only has a modification date.
pub(crate) fn video(modified: &str) -> Metadata {
    Metadata::new().with(MIME_TYPE, "video/quicktime").with(FILE_MODIFY_DATE, modified)
}

/// Drain a library stream, failing the test on the first error.
pub(crate) async fn collect<T>(stream: impl Stream<Item = Result<T>>) -> Vec<T> {
    stream.map(|item| item.unwrap()).collect().await
}
