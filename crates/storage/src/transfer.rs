//! Collision-safe move/copy primitives.
//!
//! None of the functions here ever replace an existing file. Every transfer
//! runs on the blocking pool via [`spawn_blocking`], and a blocking task keeps
//! running even if the future awaiting it is dropped, so a relocation that
//! has started always finishes.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorKind, Result};

/// What happens to the source file once it has a new home.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    /// Rename into place, falling back to copy + delete across filesystems.
    #[display("move")]
    Move,
    /// Leave the source untouched.
    #[default]
    #[display("copy")]
    Copy,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f).await.map_err(ErrorKind::Interrupted)?
}

/// Move or copy `file` into `dest_dir`, keeping its file name.
///
/// `dest_dir` is created (recursively) when missing. Fails with
/// [`ErrorKind::AlreadyExists`] instead of overwriting when `dest_dir`
/// already holds an entry of the same name.
#[instrument(level = "debug", skip_all, fields(mode = %mode, file = %file.as_ref().display(), dest = %dest_dir.as_ref().display()))]
pub async fn transfer(mode: Transfer, file: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let file = file.as_ref().to_path_buf();
    let dest_dir = dest_dir.as_ref().to_path_buf();
    blocking(move || {
        let name = file.file_name().ok_or_else(|| ErrorKind::InvalidPath(file.clone()))?;
        let dest = dest_dir.join(name);
        prepare_destination(&dest_dir, &dest)?;
        match mode {
            Transfer::Copy => copy_preserving(&file, &dest)?,
            Transfer::Move => match fs::rename(&file, &dest) {
                Ok(()) => {},
                Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                    debug!(file = %file.display(), "rename crosses filesystems, copying instead");
                    copy_preserving(&file, &dest)?;
                    fs::remove_file(&file).map_err(|e| ErrorKind::from_io(e, &file))?;
                },
                Err(err) => exn::bail!(ErrorKind::from_io(err, &file)),
            },
        }
        Ok(dest)
    })
    .await
}

/// Last line of defence before any bytes move: the target must not exist and
/// its parent must be (or become) a directory.
fn prepare_destination(dest_dir: &Path, dest: &Path) -> Result<()> {
    if fs::symlink_metadata(dest).is_ok() {
        exn::bail!(ErrorKind::AlreadyExists(dest.to_path_buf()));
    }
    if let Ok(metadata) = fs::metadata(dest_dir)
        && !metadata.is_dir()
    {
        exn::bail!(ErrorKind::NotADirectory(dest_dir.to_path_buf()));
    }
    fs::create_dir_all(dest_dir).map_err(|e| ErrorKind::from_io(e, dest_dir))?;
    Ok(())
}

/// Copy bytes, permissions and modification time. The destination is opened
/// with `create_new`, so even a file that appeared after
/// [`prepare_destination`] ran is never truncated.
fn copy_preserving(src: &Path, dest: &Path) -> Result<()> {
    let mut input = File::open(src).map_err(|e| ErrorKind::from_io(e, src))?;
    let metadata = input.metadata().map_err(|e| ErrorKind::from_io(e, src))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| ErrorKind::from_io(e, dest))?;
    let copied = io::copy(&mut input, &mut output).and_then(|_| {
        output.set_permissions(metadata.permissions())?;
        if let Ok(modified) = metadata.modified() {
            output.set_modified(modified)?;
        }
        output.sync_all()
    });
    if let Err(err) = copied {
        // Never leave a truncated copy behind that looks like a real file.
        drop(output);
        _ = fs::remove_file(dest);
        exn::bail!(ErrorKind::from_io(err, dest));
    }
    Ok(())
}

/// Create a fresh, uniquely named directory `<dest_dir>/<name>.<random>` to
/// hold a file whose natural destination is taken.
#[instrument(level = "debug", skip_all, fields(dest = %dest_dir.as_ref().display()))]
pub async fn disambiguation_dir(dest_dir: impl AsRef<Path>, name: impl Into<OsString>) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref().to_path_buf();
    let mut prefix = name.into();
    prefix.push(".");
    blocking(move || {
        fs::create_dir_all(&dest_dir).map_err(|e| ErrorKind::from_io(e, &dest_dir))?;
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&dest_dir)
            .map_err(|e| ErrorKind::from_io(e, &dest_dir))?;
        Ok(dir.keep())
    })
    .await
}

/// Get rid of a file: moved into `trash` when given, deleted otherwise.
///
/// Returns where the file ended up, if anywhere.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn discard(path: impl AsRef<Path>, trash: Option<&Path>) -> Result<Option<PathBuf>> {
    let path = path.as_ref();
    let name = path.file_name().ok_or_else(|| ErrorKind::InvalidPath(path.to_path_buf()))?;
    let trashed = match trash {
        Some(trash) => {
            let dir = match tokio::fs::try_exists(trash.join(name)).await {
                Ok(true) => disambiguation_dir(trash, name).await?,
                _ => trash.to_path_buf(),
            };
            Some(transfer(Transfer::Move, path, dir).await?)
        },
        None => {
            tokio::fs::remove_file(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
            None
        },
    };
    Ok(trashed)
}

/// Remove `dir` if it has no entries at all. Returns whether it was removed.
pub async fn remove_if_empty(dir: impl AsRef<Path>) -> Result<bool> {
    let dir = dir.as_ref();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => exn::bail!(ErrorKind::from_io(err, dir)),
    };
    if entries.next_entry().await.map_err(|e| ErrorKind::from_io(e, dir))?.is_some() {
        return Ok(false);
    }
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => Ok(true),
        // Something was created between the listing and the removal.
        Err(err) if err.kind() == io::ErrorKind::DirectoryNotEmpty => Ok(false),
        Err(err) => exn::bail!(ErrorKind::from_io(err, dir)),
    }
}

/// Remove every directory below `root` that is empty, or only contains
/// directories that are themselves empty. The root itself always survives.
///
/// Returns the removed directories, deepest first.
#[instrument(skip_all, fields(root = %root.as_ref().display()))]
pub async fn remove_empty_dirs(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref().to_path_buf();
    blocking(move || {
        let mut removed = Vec::new();
        let entries = fs::read_dir(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                prune_empty(&entry.path(), &mut removed);
            }
        }
        Ok(removed)
    })
    .await
}

/// Post-order helper for [`remove_empty_dirs`]; returns whether `dir` was
/// removed. Unreadable directories are left alone.
fn prune_empty(dir: &Path, removed: &mut Vec<PathBuf>) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "cannot read directory");
            return false;
        },
    };
    let mut remaining = 0usize;
    for entry in entries {
        let Ok(entry) = entry else {
            remaining += 1;
            continue;
        };
        // `DirEntry::file_type` does not follow symlinks, so linked
        // directories count as content and are never descended into.
        let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
        if !is_dir || !prune_empty(&entry.path(), removed) {
            remaining += 1;
        }
    }
    if remaining > 0 {
        return false;
    }
    match fs::remove_dir(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "removed empty directory");
            removed.push(dir.to_path_buf());
            true
        },
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "cannot remove empty directory");
            false
        },
    }
}
