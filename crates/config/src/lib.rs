//! Layered configuration for shashin.
//!
//! Sources, later ones winning:
//! 1. built-in defaults,
//! 2. a TOML file: the one named by the caller or by `SHASHIN_CONFIG`,
//!    otherwise `config.toml` in the platform config directory,
//! 3. `SHASHIN_*` environment variables, with `__` separating nested keys
//!    (`SHASHIN_IMPORT__SOURCE=/media/card`).

pub mod error;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use shashin_library::Hierarchy;
use shashin_library::import::DuplicatePolicy;
use shashin_storage::{SYNOLOGY_THUMBNAILS, Transfer, is_child, normalize_path};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ErrorKind, Result};

/// Names a config file explicitly.
pub const CONFIG_ENV: &str = "SHASHIN_CONFIG";
const ENV_PREFIX: &str = "SHASHIN_";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "cache.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the organized library.
    pub library: PathBuf,
    /// The cache database.
    pub database: PathBuf,
    pub hierarchy: Hierarchy,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// Where deleted files are moved. Deleted outright when unset.
    #[serde(default)]
    pub trash: Option<PathBuf>,
    /// How many files are extracted at once.
    pub concurrency: usize,
    /// Explicit `exiftool` binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub exiftool: Option<PathBuf>,
    /// Bring files in from elsewhere before organizing.
    #[serde(default)]
    pub import: Option<ImportConfig>,
    /// Write a capture date into photos that have none, from their
    /// modification date.
    #[serde(default)]
    pub fix_dates: bool,
    /// Report what would move without touching the library or the source.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub source: PathBuf,
    #[serde(default)]
    pub transfer: Transfer,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

/// Everything that has a sensible default. `library` never does.
#[derive(Serialize)]
struct Defaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<PathBuf>,
    hierarchy: Hierarchy,
    skip_dirs: Vec<String>,
    concurrency: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            database: dirs().map(|dirs| dirs.cache_dir().join(DATABASE_FILE)),
            hierarchy: Hierarchy::default(),
            skip_dirs: vec![SYNOLOGY_THUMBNAILS.to_string()],
            concurrency: 1,
        }
    }
}

fn dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "shashin")
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// `file` takes precedence over `SHASHIN_CONFIG`; an explicitly named
    /// file must exist, the default one need not.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let explicit = file.map(Path::to_path_buf).or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let file = match explicit {
            Some(file) => {
                exn::ensure!(file.is_file(), ErrorKind::NotFound(file));
                Some(file)
            },
            None => dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)),
        };
        if let Some(file) = &file {
            debug!(path = %file.display(), "reading config file");
        }
        let config: Self = Self::figment(file.as_deref()).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The layered sources, without extracting or validating anything.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Defaults::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    /// Reject configurations that would have the library operations fail
    /// halfway, or worse.
    pub fn validate(&self) -> Result<()> {
        exn::ensure!(self.concurrency > 0, ErrorKind::Concurrency);
        exn::ensure!(!self.library.exists() || self.library.is_dir(), ErrorKind::Library(self.library.clone()));
        let library = normalize_path(&self.library).or_raise(|| ErrorKind::InvalidPath(self.library.clone()))?;
        let source = match &self.import {
            Some(import) => {
                let source =
                    normalize_path(&import.source).or_raise(|| ErrorKind::InvalidPath(import.source.clone()))?;
                let overlaps = source == library || is_child(&library, &source) || is_child(&source, &library);
                exn::ensure!(!overlaps, ErrorKind::ImportSource(import.source.clone()));
                Some(source)
            },
            None => None,
        };
        if let Some(trash) = &self.trash {
            let normalized = normalize_path(trash).or_raise(|| ErrorKind::InvalidPath(trash.clone()))?;
            let walked = |dir: &Path| normalized == dir || is_child(dir, &normalized);
            exn::ensure!(!walked(&library), ErrorKind::Trash(trash.clone()));
            exn::ensure!(!source.as_deref().is_some_and(walked), ErrorKind::Trash(trash.clone()));
        }
        Ok(())
    }
}
