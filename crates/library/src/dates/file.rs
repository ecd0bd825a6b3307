use exn::{OptionExt, ResultExt};
use shashin_cache::{FileRecord, Repository};
use shashin_extract::MetadataWriter;
use shashin_extract::consts::{DATE_TIME_ORIGINAL, FILE_MODIFY_DATE};
use shashin_storage::FileStat;
use std::path::Path;
use tracing::info;

use crate::Context;
use crate::dates::error::{ErrorKind, Result as DatesResult};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::scan::extract;

/// What fixing one file's capture date did.
#[derive(Debug, Clone, PartialEq)]
pub enum DateFix {
    /// `DateTimeOriginal` was set to `value`, copied from the file's
    /// modification date.
    Written { value: String, record: FileRecord },
    /// The file already carries a capture date; only its record was
    /// refreshed.
    AlreadyDated(FileRecord),
}

impl DateFix {
    /// The file's record as it stands now.
    pub fn record(&self) -> &FileRecord {
        match self {
            Self::Written { record, .. } | Self::AlreadyDated(record) => record,
        }
    }
}

/// Copy a photo's `FileModifyDate` into its `DateTimeOriginal`, unless the
/// file turns out to have a capture date already.
///
/// The file's live metadata decides, not the cache. Either way the file is
/// scanned afterwards and its record rewritten.
///
/// # Errors
/// Returns [`Exn<LibraryErrorKind::FixDates>`](LibraryErrorKind::FixDates)
/// raised from an inner [`Exn<ErrorKind>`](ErrorKind).
pub async fn fix_date(
    cache: &Repository,
    ctx: &Context,
    writer: &dyn MetadataWriter,
    path: impl AsRef<Path>,
) -> LibraryResult<DateFix> {
    fix_date_inner(cache, ctx, writer, path.as_ref()).await.or_raise(|| LibraryErrorKind::FixDates)
}

pub(crate) async fn fix_date_inner(
    cache: &Repository,
    ctx: &Context,
    writer: &dyn MetadataWriter,
    path: &Path,
) -> DatesResult<DateFix> {
    let metadata = ctx.metadata.metadata(path).await.or_raise(|| ErrorKind::Metadata)?;
    if metadata.date(DATE_TIME_ORIGINAL).is_some() {
        return Ok(DateFix::AlreadyDated(rescan(cache, ctx, path).await?));
    }
    exn::ensure!(metadata.date(FILE_MODIFY_DATE).is_some(), ErrorKind::NoDate);
    let modified = metadata.str(FILE_MODIFY_DATE).ok_or_raise(|| ErrorKind::NoDate)?;
    // `YYYY:MM:DD HH:MM:SS`; DateTimeOriginal has no room for a zone offset.
    let value = modified.get(..19).unwrap_or(modified).to_string();
    writer.write(path, DATE_TIME_ORIGINAL, &value).await.or_raise(|| ErrorKind::Write)?;
    info!(path = %path.display(), %value, "wrote capture date");
    let record = rescan(cache, ctx, path).await?;
    Ok(DateFix::Written { value, record })
}

async fn rescan(cache: &Repository, ctx: &Context, path: &Path) -> DatesResult<FileRecord> {
    let stat = FileStat::read(path).await.or_raise(|| ErrorKind::Storage)?;
    let record = extract(ctx, stat).await.or_raise(|| ErrorKind::Scan)?;
    cache.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
    Ok(record)
}
