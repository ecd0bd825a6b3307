//! Keeps a photo library organized by capture date.
//!
//! One run brings the cache up to date with the library, optionally writes
//! capture dates into undated photos, optionally imports new files from the
//! configured source, and files everything under `YYYY/MM/DD`. A dry run
//! prints the planned moves instead. Configuration comes from `config.toml`
//! and `SHASHIN_*` variables, see [`shashin_config`].

mod error;

use exn::ResultExt;
use futures::StreamExt;
use shashin_cache::{Database, Repository};
use shashin_config::Config;
use shashin_extract::{DifferenceHasher, ExifTool, MetadataWriter};
use shashin_library::Context;
use shashin_library::dates::{FixDatesEvent, fix_dates};
use shashin_library::import::{ImportAction, ImportEvent, import};
use shashin_library::organize::{OrganizeEvent, Organizer, organize};
use shashin_library::scan::{ScanEvent, scan};
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{ErrorKind, Result};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run() -> Result<()> {
    let config = Config::load(None).or_raise(|| ErrorKind::Config)?;
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Cache)?;
    let exiftool = Arc::new(match &config.exiftool {
        Some(binary) => ExifTool::with_binary(binary),
        None => ExifTool::discover().or_raise(|| ErrorKind::Metadata)?,
    });
    let ctx = Context::new(exiftool.clone(), Arc::new(DifferenceHasher))
        .with_skip_dirs(config.skip_dirs.iter().cloned())
        .with_concurrency(config.concurrency)
        .with_trash(config.trash.clone());

    let result = library(&Repository::from(&db), &ctx, &*exiftool, &config).await;
    if let Err(err) = exiftool.close().await {
        warn!("exiftool did not shut down cleanly: {err:?}");
    }
    db.close().await;
    result
}

async fn library(cache: &Repository, ctx: &Context, writer: &dyn MetadataWriter, config: &Config) -> Result<()> {
    let organizer = Organizer::new(&config.library, config.hierarchy.clone())
        .await
        .or_raise(|| ErrorKind::Library)?
        .with_dry_run(config.dry_run);
    info!(library = %organizer.root().display(), hierarchy = %organizer.hierarchy(), dry_run = config.dry_run, "starting");

    let mut events = pin!(scan(cache, ctx, organizer.root()));
    while let Some(event) = events.next().await {
        if let ScanEvent::Complete(summary) = event.or_raise(|| ErrorKind::Scan)? {
            println!("scan: {summary}");
        }
    }

    match (config.fix_dates, config.dry_run) {
        (true, true) => warn!("not writing capture dates during a dry run"),
        (true, false) => {
            let mut events = pin!(fix_dates(cache, ctx, writer, organizer.root()));
            while let Some(event) = events.next().await {
                if let FixDatesEvent::Complete(summary) = event.or_raise(|| ErrorKind::FixDates)? {
                    println!("fix dates: {summary}");
                }
            }
        },
        (false, _) => {},
    }

    if let Some(incoming) = &config.import {
        let mut events = pin!(import(cache, ctx, &organizer, &incoming.source, incoming.transfer, incoming.duplicates));
        while let Some(event) = events.next().await {
            match event.or_raise(|| ErrorKind::Import)? {
                ImportEvent::Handled(action) if config.dry_run => match *action {
                    ImportAction::Imported { from, relocation, .. } => {
                        println!("{} {} {}", incoming.transfer, from.display(), relocation.path().display());
                    },
                    ImportAction::Deleted { from, .. } => println!("rm {}", from.display()),
                    ImportAction::Skipped { .. } => {},
                },
                ImportEvent::Complete(summary) => println!("import: {summary}"),
                _ => {},
            }
        }
    }

    let mut events = pin!(organize(cache, ctx, &organizer));
    while let Some(event) = events.next().await {
        match event.or_raise(|| ErrorKind::Organize)? {
            OrganizeEvent::Organized(organized) if config.dry_run && !organized.relocation.is_noop() => {
                println!("mv {} {}", organized.from.display(), organized.relocation.path().display());
            },
            OrganizeEvent::Complete(summary) => println!("organize: {summary}"),
            _ => {},
        }
    }
    Ok(())
}
