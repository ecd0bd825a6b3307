use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use shashin_extract::{Metadata, PerceptualHash};
use shashin_storage::FileStat;
use std::path::PathBuf;

/// Everything the cache knows about one file.
///
/// `checksum`, `hash` and `metadata` describe the file as it was when it had
/// this `(mtime, size)`; they are only trustworthy while [`is_fresh`]
/// holds.
///
/// [`is_fresh`]: FileRecord::is_fresh
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Absolute, normalized path. Unique.
    pub path: PathBuf,
    pub mtime: f64,
    pub size: u64,
    /// BLAKE3 digest of the file's bytes.
    pub checksum: String,
    /// Perceptual hash; absent for non-images and undecodable images.
    pub hash: Option<PerceptualHash>,
    pub metadata: Metadata,
}

impl FileRecord {
    pub fn new(stat: FileStat, checksum: impl Into<String>, hash: Option<PerceptualHash>, metadata: Metadata) -> Self {
        Self { path: stat.path, mtime: stat.mtime, size: stat.size, checksum: checksum.into(), hash, metadata }
    }

    /// Whether the live file still looks exactly like it did when this record
    /// was written.
    pub fn is_fresh(&self, stat: &FileStat) -> bool {
        self.path == stat.path && self.mtime == stat.mtime && self.size == stat.size
    }

    /// The same contents, found at a new location. Used after a file has been
    /// moved or copied, since the move may not preserve the timestamp to the
    /// exact fraction of a second.
    pub fn relocated(self, stat: FileStat) -> Self {
        Self { path: stat.path, mtime: stat.mtime, size: stat.size, ..self }
    }
}

/// Outcome of writing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No record existed at that path before.
    Inserted,
    /// An existing record was overwritten.
    Updated,
}

/// All files sharing one perceptual hash.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub hash: PerceptualHash,
    pub files: Vec<FileRecord>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) path: String,
    pub(crate) mtime: f64,
    pub(crate) size: i64,
    pub(crate) checksum: String,
    pub(crate) hash: Option<Vec<u8>>,
    pub(crate) metadata: String,
}

impl TryFrom<&FileRecord> for FileRow {
    type Error = Error;
    fn try_from(record: &FileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            path: record.path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            mtime: record.mtime,
            size: i64::try_from(record.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            checksum: record.checksum.clone(),
            hash: record.hash.map(|hash| hash.as_bytes().to_vec()),
            metadata: record.metadata.to_json().or_raise(|| ErrorKind::InvalidData("metadata"))?,
        })
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: PathBuf::from(row.path),
            mtime: row.mtime,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            checksum: row.checksum,
            hash: row
                .hash
                .as_deref()
                .map(PerceptualHash::try_from)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("perceptual hash"))?,
            metadata: Metadata::from_json(&row.metadata).or_raise(|| ErrorKind::InvalidData("metadata"))?,
        })
    }
}
