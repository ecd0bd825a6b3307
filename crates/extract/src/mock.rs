//! In-memory providers for tests in this and other crates.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{ErrorKind, Result};
use crate::models::{HASH_BYTES, Metadata, PerceptualHash};
use crate::provider::{HashProvider, MetadataProvider, MetadataWriter};

fn file_name(path: &Path) -> OsString {
    path.file_name().unwrap_or(OsStr::new("")).to_os_string()
}

/// Returns canned metadata keyed by file name. Unknown names are reported
/// as unsupported files.
///
/// Also a [`MetadataWriter`]: a write changes what later reads of that name
/// return.
#[derive(Debug, Default)]
pub struct MockMetadataProvider {
    entries: Mutex<HashMap<OsString, Metadata>>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl MockMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<OsString>, metadata: Metadata) -> Self {
        self.set(name, metadata);
        self
    }

    /// Change what future calls return for `name`.
    pub fn set(&self, name: impl Into<OsString>, metadata: Metadata) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(name.into(), metadata);
    }

    /// Number of times [`MetadataProvider::metadata`] has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of successful [`MetadataWriter::write`] calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    async fn metadata(&self, path: &Path) -> Result<Metadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&file_name(path)) {
            Some(metadata) => Ok(metadata.clone().with(crate::consts::SOURCE_FILE, path.to_string_lossy())),
            None => exn::bail!(ErrorKind::Unsupported(path.to_path_buf(), "no canned metadata".into())),
        }
    }
}

#[async_trait]
impl MetadataWriter for MockMetadataProvider {
    async fn write(&self, path: &Path, tag: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&file_name(path)) {
            Some(metadata) => {
                metadata.insert(tag, value);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None => exn::bail!(ErrorKind::Unsupported(path.to_path_buf(), "no canned metadata".into())),
        }
    }
}

/// Hashes the file's bytes, so files with identical contents share a
/// "perceptual" hash. Individual names can be pinned to a fixed hash or made
/// to fail.
#[derive(Debug, Default)]
pub struct MockHashProvider {
    pinned: Mutex<HashMap<OsString, PerceptualHash>>,
    failing: Mutex<HashSet<OsString>>,
    calls: AtomicUsize,
}

impl MockHashProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(self, name: impl Into<OsString>, hash: PerceptualHash) -> Self {
        self.pinned.lock().unwrap_or_else(PoisonError::into_inner).insert(name.into(), hash);
        self
    }

    pub fn failing(self, name: impl Into<OsString>) -> Self {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner).insert(name.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HashProvider for MockHashProvider {
    async fn hash(&self, path: &Path) -> Result<PerceptualHash> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = file_name(path);
        if self.failing.lock().unwrap_or_else(PoisonError::into_inner).contains(&name) {
            exn::bail!(ErrorKind::Unsupported(path.to_path_buf(), "configured to fail".into()));
        }
        let pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner).get(&name).copied();
        if let Some(hash) = pinned {
            return Ok(hash);
        }
        let bytes = tokio::fs::read(path).await.map_err(|_| ErrorKind::Unreadable(path.to_path_buf()))?;
        let digest = blake3::hash(&bytes);
        let mut hash = [0u8; HASH_BYTES];
        hash.copy_from_slice(&digest.as_bytes()[..HASH_BYTES]);
        Ok(PerceptualHash::new(hash))
    }
}
