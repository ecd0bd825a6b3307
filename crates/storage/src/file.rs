use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// The live filesystem state of a single file.
///
/// `(mtime, size)` is what the cache compares against to decide whether a
/// stored record can be trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    /// Absolute, normalized path.
    pub path: PathBuf,
    /// Modification time as fractional seconds since the Unix epoch.
    pub mtime: f64,
    /// File size in bytes.
    pub size: u64,
}

impl FileStat {
    /// Stat a file on disk, following symlinks.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = crate::path::normalize(path)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?;
        if metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(path));
        }
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        // Filesystems without mtime support report the epoch; such files are
        // still tracked, they will just never look stale by time alone.
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |since| since.as_secs_f64());
        Self { path: path.into(), mtime, size: metadata.len() }
    }

    /// File name component; every path yielded by the walker has one.
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// BLAKE3 digest of a file's bytes, hex encoded.
///
/// Hashing runs on the blocking pool so large videos don't stall the runtime.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub async fn checksum(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let file = std::fs::File::open(&path).map_err(|e| ErrorKind::from_io(e, &path))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(file).map_err(|e| ErrorKind::from_io(e, &path))?;
        Ok(hasher.finalize().to_hex().to_string())
    })
    .await
    .map_err(ErrorKind::Interrupted)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_reports_size_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"twelve bytes").unwrap();
        let stat = FileStat::read(&path).await.unwrap();
        assert_eq!(stat.size, 12);
        assert!(stat.mtime > 0.0);
        assert_eq!(stat.file_name().unwrap(), "a.jpg");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStat::read(dir.path().join("missing.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStat::read(dir.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_checksum_depends_on_contents_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"same").unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"same").unwrap();
        std::fs::write(dir.path().join("c.jpg"), b"different").unwrap();
        let a = checksum(dir.path().join("a.jpg")).await.unwrap();
        let b = checksum(dir.path().join("b.jpg")).await.unwrap();
        let c = checksum(dir.path().join("c.jpg")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, blake3::hash(b"same").to_hex().to_string());
    }
}
