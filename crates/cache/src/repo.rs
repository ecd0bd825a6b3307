//! Repository over the `files` and `ignored` tables.
//!
//! Every write that touches more than one row runs in a single transaction,
//! so readers never observe a half-applied change (a record whose hash
//! changed while its old hash is still dismissed, or a moved file that is
//! briefly tracked at both locations).

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{DuplicateGroup, FileRecord, FileRow, Upsert};
use exn::{OptionExt, ResultExt};
use futures::{Stream, StreamExt, TryStreamExt};
use shashin_extract::PerceptualHash;
use shashin_storage::FileStat;
use sqlx::{SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Repository for file records and dismissed duplicate hashes.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    fn rows_to_records(rows: Vec<FileRow>) -> Result<Vec<FileRecord>> {
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Exact lookup by absolute path.
    pub async fn get(&self, path: impl AsRef<Path>) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_by_path.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    /// The record for `stat.path`, but only if it was written for exactly this
    /// `(mtime, size)`. Freshness is decided by the query itself, so there is
    /// no window between reading the record and comparing it.
    pub async fn get_if_fresh(&self, stat: &FileStat) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_if_fresh.sql"))
            .bind(Self::sqlx_hates_paths(&stat.path)?)
            .bind(stat.mtime)
            .bind(i64::try_from(stat.size).or_raise(|| ErrorKind::InvalidData("file size"))?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    /// Every record with byte-identical contents, ordered by path.
    pub async fn get_by_checksum(&self, checksum: &str, size: u64) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/get_by_checksum.sql"))
            .bind(checksum)
            .bind(i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::rows_to_records(rows)
    }

    /// Stream every record, ordered by path.
    pub fn list(&self) -> impl Stream<Item = Result<FileRecord>> + Send + '_ {
        sqlx::query_as::<_, FileRow>(include_str!("../queries/list_files.sql"))
            .fetch(&self.pool)
            .map(|row| row.or_raise(|| ErrorKind::Database).and_then(FileRecord::try_from))
    }

    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count_files.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }

    // =========================================================================
    // Insert/Update
    // =========================================================================

    /// Write `record`, replacing whatever was stored for its path.
    ///
    /// When the path previously carried a different perceptual hash, that
    /// hash is dropped from the ignore set in the same transaction: the file
    /// changed, so an operator's earlier "these are not duplicates" verdict no
    /// longer covers it.
    #[instrument(level = "debug", skip_all, fields(path = %record.path.display()))]
    pub async fn upsert(&self, record: &FileRecord) -> Result<Upsert> {
        let row = FileRow::try_from(record)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let outcome = Self::upsert_row(&mut tx, row).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(outcome)
    }

    /// Atomically swap the record at `old_path` for `record` (at its new
    /// path). Used after the organizer moved a file, so the file is never
    /// tracked at both locations, nor at neither.
    #[instrument(level = "debug", skip_all, fields(from = %old_path.as_ref().display(), to = %record.path.display()))]
    pub async fn replace(&self, old_path: impl AsRef<Path>, record: &FileRecord) -> Result<Upsert> {
        let old_path = Self::sqlx_hates_paths(old_path)?;
        let row = FileRow::try_from(record)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        if old_path != row.path {
            let old_hash: Option<Option<Vec<u8>>> = sqlx::query_scalar(include_str!("../queries/get_hash_by_path.sql"))
                .bind(&old_path)
                .fetch_optional(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if let Some(Some(old_hash)) = old_hash
                && row.hash.as_ref() != Some(&old_hash)
            {
                Self::clear_ignored(&mut tx, &old_hash).await?;
            }
            sqlx::query(include_str!("../queries/delete_by_path.sql"))
                .bind(&old_path)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        let outcome = Self::upsert_row(&mut tx, row).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(outcome)
    }

    async fn upsert_row(conn: &mut SqliteConnection, row: FileRow) -> Result<Upsert> {
        let old_hash: Option<Option<Vec<u8>>> = sqlx::query_scalar(include_str!("../queries/get_hash_by_path.sql"))
            .bind(&row.path)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(Some(old_hash)) = &old_hash
            && row.hash.as_ref() != Some(old_hash)
        {
            Self::clear_ignored(&mut *conn, old_hash).await?;
        }
        sqlx::query(include_str!("../queries/upsert_file.sql"))
            .bind(row.path)
            .bind(row.mtime)
            .bind(row.size)
            .bind(row.checksum)
            .bind(row.hash)
            .bind(row.metadata)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(match old_hash {
            Some(_) => Upsert::Updated,
            None => Upsert::Inserted,
        })
    }

    async fn clear_ignored(conn: &mut SqliteConnection, hash: &[u8]) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_ignored.sql"))
            .bind(hash)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() > 0 {
            debug!("perceptual hash of a changed file is no longer ignored");
        }
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Forget the record at `path`. Returns whether there was one.
    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_by_path.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record for which `predicate` returns `true`, returning the
    /// deleted paths.
    ///
    /// All records are read (and judged) before the first delete, and the
    /// deletes are applied in one transaction.
    #[instrument(skip_all)]
    pub async fn prune<F>(&self, mut predicate: F) -> Result<Vec<PathBuf>>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let doomed: Vec<PathBuf> = self
            .list()
            .try_filter_map(|record| futures::future::ready(Ok(predicate(&record).then_some(record.path))))
            .try_collect()
            .await?;
        if doomed.is_empty() {
            return Ok(doomed);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for path in &doomed {
            sqlx::query(include_str!("../queries/delete_by_path.sql"))
                .bind(Self::sqlx_hates_paths(path)?)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        debug!(count = doomed.len(), "pruned file records");
        Ok(doomed)
    }

    // =========================================================================
    // Duplicates
    // =========================================================================

    /// Up to `limit` groups of records sharing a perceptual hash, for hashes
    /// strictly greater than `cursor`, in ascending hash order.
    ///
    /// Ignored hashes and hashes held by a single record never form a group.
    /// Groups are built from the cache alone: a member whose file has since
    /// disappeared is still listed until the next prune.
    pub async fn duplicates_after(&self, cursor: Option<&PerceptualHash>, limit: u32) -> Result<Vec<DuplicateGroup>> {
        let cursor = cursor.map(PerceptualHash::as_bytes).unwrap_or_default();
        let mut rows = sqlx::query_as::<_, FileRow>(include_str!("../queries/duplicates_after.sql"))
            .bind(cursor)
            .bind(i64::from(limit))
            .fetch(&self.pool);

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        while let Some(row) = rows.try_next().await.or_raise(|| ErrorKind::Database)? {
            let record = FileRecord::try_from(row)?;
            let hash = record.hash.ok_or_raise(|| ErrorKind::InvalidData("perceptual hash"))?;
            match groups.last_mut() {
                Some(group) if group.hash == hash => group.files.push(record),
                _ => groups.push(DuplicateGroup { hash, files: vec![record] }),
            }
        }
        Ok(groups)
    }

    /// Dismiss a perceptual hash. Returns `false` if it already was.
    pub async fn ignore(&self, hash: &PerceptualHash) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/insert_ignored.sql"))
            .bind(hash.as_bytes())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Undo [`ignore`](Self::ignore). Returns `false` if the hash was not
    /// ignored.
    pub async fn unignore(&self, hash: &PerceptualHash) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_ignored.sql"))
            .bind(hash.as_bytes())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_ignored(&self, hash: &PerceptualHash) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(include_str!("../queries/is_ignored.sql"))
            .bind(hash.as_bytes())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(exists != 0)
    }

    pub async fn list_ignored(&self) -> Result<Vec<PerceptualHash>> {
        let hashes: Vec<Vec<u8>> = sqlx::query_scalar(include_str!("../queries/list_ignored.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        hashes
            .iter()
            .map(|bytes| PerceptualHash::try_from(bytes.as_slice()).or_raise(|| ErrorKind::InvalidData("perceptual hash")))
            .collect()
    }
}
