use exn::{OptionExt, ResultExt};
use shashin_cache::FileRecord;
use shashin_extract::Metadata;
use shashin_storage::transfer::{disambiguation_dir, transfer};
use shashin_storage::{Transfer, is_child, normalize_path, validate_path};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::Hierarchy;
use crate::organize::conflict::{self, Collision};
use crate::organize::error::{ErrorKind, Result};

/// Where a relocated file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// The file already lives below its destination. Nothing was touched.
    AlreadyInPlace(PathBuf),
    /// The file was moved or copied into its destination directory.
    Relocated(PathBuf),
    /// The destination already held something under the same name, so the
    /// file went into a fresh disambiguation directory next to it.
    /// `identical` when that something had exactly the same bytes.
    ///
    /// In a dry run `path` is the path the file collides with: the
    /// disambiguation directory is only picked when the file is transferred.
    Disambiguated { path: PathBuf, identical: bool },
}

impl Relocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::AlreadyInPlace(path) | Self::Relocated(path) | Self::Disambiguated { path, .. } => path,
        }
    }

    /// Whether the filesystem was left untouched.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::AlreadyInPlace(_))
    }
}

/// Places files into a library according to a [`Hierarchy`].
///
/// Relocations through one organizer are serialized, so two files with the
/// same name can never both find the same destination free.
///
/// A dry-run organizer plans every relocation but transfers nothing, and the
/// operations driving it leave the library and the source alone.
#[derive(Debug)]
pub struct Organizer {
    root: PathBuf,
    hierarchy: Hierarchy,
    dry_run: bool,
    lock: Mutex<()>,
}

impl Organizer {
    /// Fails with [`ErrorKind::Root`] unless `root` is an existing directory.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn new(root: impl AsRef<Path>, hierarchy: Hierarchy) -> Result<Self> {
        let root = normalize_path(root).or_raise(|| ErrorKind::Root)?;
        let organizer = Self { root, hierarchy, dry_run: false, lock: Mutex::new(()) };
        organizer.check_root().await?;
        Ok(organizer)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Make sure the root is still a directory before a batch starts.
    pub(crate) async fn check_root(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.root).await.or_raise(|| ErrorKind::Root)?;
        exn::ensure!(metadata.is_dir(), ErrorKind::Root);
        Ok(())
    }

    /// The absolute directory a file with this metadata belongs in.
    pub fn destination(&self, metadata: &Metadata) -> Result<PathBuf> {
        let relative = self.hierarchy.destination(metadata).or_raise(|| ErrorKind::Hierarchy)?;
        let relative = validate_path(relative).or_raise(|| ErrorKind::Invariant)?;
        let destination = self.root.join(relative);
        exn::ensure!(is_child(&self.root, &destination), ErrorKind::Invariant);
        Ok(destination)
    }

    /// Whether `path` already lives below the destination for `metadata`.
    pub fn is_in_place(&self, path: &Path, metadata: &Metadata) -> Result<bool> {
        Ok(is_child(self.destination(metadata)?, path))
    }

    /// Move or copy the file described by `record` to its destination.
    ///
    /// - Already below its destination: no-op, the current path is returned.
    /// - Destination free: the directory is created and the file transferred
    ///   into it.
    /// - Destination name taken: the file goes into a new
    ///   `<name>.<random>` directory inside the destination instead. Whatever
    ///   was there is never replaced.
    ///
    /// Content duplicates are the caller's business; this always relocates.
    /// `record.checksum` must describe the file's current bytes.
    #[instrument(skip_all, fields(path = %record.path.display(), mode = %mode))]
    pub async fn relocate(&self, record: &FileRecord, mode: Transfer) -> Result<Relocation> {
        let destination = self.destination(&record.metadata)?;
        if is_child(&destination, &record.path) {
            return Ok(Relocation::AlreadyInPlace(record.path.clone()));
        }
        let name = record.path.file_name().ok_or_raise(|| ErrorKind::Storage)?;

        let _guard = self.lock.lock().await;
        let collision = conflict::check(&destination.join(name), &record.checksum).await?;
        if self.dry_run {
            let planned = destination.join(name);
            info!(from = %record.path.display(), to = %planned.display(), "would relocate");
            return Ok(match collision {
                Collision::Free => Relocation::Relocated(planned),
                Collision::Taken { identical } => Relocation::Disambiguated { path: planned, identical },
            });
        }
        let dir = match collision {
            Collision::Free => destination,
            Collision::Taken { identical } => {
                if identical {
                    warn!(
                        path = %record.path.display(),
                        destination = %destination.display(),
                        "identical file already in destination; keeping both",
                    );
                }
                disambiguation_dir(&destination, name).await.or_raise(|| ErrorKind::Storage)?
            },
        };
        let path = match transfer(mode, &record.path, &dir).await {
            Ok(path) => path,
            Err(err) if err.is_invariant() => return Err(err.raise(ErrorKind::Invariant)),
            Err(err) => return Err(err.raise(ErrorKind::Storage)),
        };
        info!(from = %record.path.display(), to = %path.display(), "relocated");
        Ok(match collision {
            Collision::Free => Relocation::Relocated(path),
            Collision::Taken { identical } => Relocation::Disambiguated { path, identical },
        })
    }
}
