use exn::ResultExt;
use shashin_cache::{DuplicateGroup, Repository};
use shashin_extract::PerceptualHash;
use tracing::debug;

use crate::duplicates::error::{ErrorKind, Result as DuplicatesResult};
use crate::duplicates::rank::Ranking;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::prune::vanished;

/// One page of duplicate groups.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePage {
    /// Ascending by hash. Every group has at least two members that existed
    /// on disk when the page was built, best ranked first.
    pub groups: Vec<DuplicateGroup>,
    /// Pass this back to get the next page. `None` once there is nothing left.
    pub next_cursor: Option<PerceptualHash>,
}

impl DuplicatePage {
    /// Rough fraction of the hash space already covered, for progress bars.
    pub fn progress(&self) -> f64 {
        self.next_cursor.map_or(1.0, |cursor| cursor.progress())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Up to `limit` duplicate groups whose hash sorts strictly after `cursor`.
///
/// The cache may still list files that were removed since the last prune.
/// Those are dropped here, and a group left with fewer than two members is
/// skipped entirely; the cache is asked again until the page is full or
/// there are no hashes left.
///
/// A `limit` of zero returns an empty page without moving the cursor.
pub async fn duplicates_after(
    cache: &Repository,
    cursor: Option<&PerceptualHash>,
    limit: u32,
    ranking: &impl Ranking,
) -> LibraryResult<DuplicatePage> {
    duplicates_after_inner(cache, cursor, limit, ranking).await.or_raise(|| LibraryErrorKind::Duplicates)
}

async fn duplicates_after_inner(
    cache: &Repository,
    cursor: Option<&PerceptualHash>,
    limit: u32,
    ranking: &impl Ranking,
) -> DuplicatesResult<DuplicatePage> {
    let mut cursor = cursor.copied();
    let mut groups = Vec::new();
    if limit == 0 {
        return Ok(DuplicatePage { groups, next_cursor: cursor });
    }
    loop {
        let wanted = limit - groups.len() as u32;
        let batch = cache.duplicates_after(cursor.as_ref(), wanted).await.or_raise(|| ErrorKind::Cache)?;
        let exhausted = (batch.len() as u32) < wanted;
        for group in batch {
            cursor = Some(group.hash);
            if let Some(group) = live(group, ranking).await {
                groups.push(group);
            }
        }
        if exhausted {
            return Ok(DuplicatePage { groups, next_cursor: None });
        }
        if groups.len() as u32 >= limit {
            return Ok(DuplicatePage { groups, next_cursor: cursor });
        }
    }
}

/// The group restricted to members still on disk, ranked. `None` if that
/// leaves nothing to compare.
async fn live(group: DuplicateGroup, ranking: &impl Ranking) -> Option<DuplicateGroup> {
    let DuplicateGroup { hash, files } = group;
    let total = files.len();
    let mut present = Vec::with_capacity(total);
    for record in files {
        if !vanished(&record.path).await {
            present.push(record);
        }
    }
    let mut files = present;
    if files.len() < total {
        debug!(%hash, gone = total - files.len(), "dropped vanished group members");
    }
    if files.len() < 2 {
        return None;
    }
    files.sort_by(|a, b| ranking.compare(a, b));
    Some(DuplicateGroup { hash, files })
}
