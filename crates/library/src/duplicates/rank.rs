use shashin_cache::FileRecord;
use shashin_extract::consts::{DATE_TIME_ORIGINAL, FILE_MODIFY_DATE};
use std::cmp::{Ordering, Reverse};
use time::Date;

/// Orders the members of a duplicate group, best candidate to keep first.
///
/// [`Ordering::Less`] means `a` is the better copy. Implementations should be
/// a total order; the sort is stable, so ties keep their path order.
pub trait Ranking {
    fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering;
}

impl<F> Ranking for F
where
    F: Fn(&FileRecord, &FileRecord) -> Ordering,
{
    fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering {
        self(a, b)
    }
}

/// No opinion: every pair ranks equal and groups stay in path order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unranked;

impl Ranking for Unranked {
    fn compare(&self, _: &FileRecord, _: &FileRecord) -> Ordering {
        Ordering::Equal
    }
}

/// Prefers the copy most likely to be the original:
///
/// 1. more megapixels,
/// 2. larger file, to one significant figure (recompressed copies shrink),
/// 3. earlier capture date, then earlier modification date,
/// 4. shorter file name (`IMG_0001.jpg` over `IMG_0001 (1).jpg`),
/// 5. larger exact file size.
///
/// Missing values rank last.
#[derive(Debug, Default, Clone, Copy)]
pub struct Heuristic;

type Key = (Reverse<u64>, Reverse<u64>, Date, Date, usize, Reverse<u64>);

impl Heuristic {
    fn key(record: &FileRecord) -> Key {
        let metadata = &record.metadata;
        // Kilopixels keep the key integral without losing anything that matters.
        let kilopixels = metadata.megapixels().map_or(0, |mp| (mp * 1000.0).round() as u64);
        let name = record.path.file_name().map_or(usize::MAX, |name| name.len());
        (
            Reverse(kilopixels),
            Reverse(round_to_one_figure(record.size)),
            metadata.date(DATE_TIME_ORIGINAL).unwrap_or(Date::MAX),
            metadata.date(FILE_MODIFY_DATE).unwrap_or(Date::MAX),
            name,
            Reverse(record.size),
        )
    }
}

impl Ranking for Heuristic {
    fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering {
        Self::key(a).cmp(&Self::key(b))
    }
}

/// `1234 -> 1000`, `1750 -> 2000`, `0 -> 0`.
fn round_to_one_figure(n: u64) -> u64 {
    if n < 10 {
        return n;
    }
    let magnitude = 10u64.pow(n.ilog10());
    let rounded = (n + magnitude / 2) / magnitude;
    rounded.saturating_mul(magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shashin_extract::Metadata;
    use shashin_extract::consts::MEGAPIXELS;
    use shashin_storage::FileStat;
    use std::path::PathBuf;

    fn record(path: &str, size: u64, metadata: Metadata) -> FileRecord {
        let stat = FileStat { path: PathBuf::from(path), mtime: 0.0, size };
        FileRecord::new(stat, "", None, metadata)
    }

    fn ranked(ranking: &impl Ranking, mut records: Vec<FileRecord>) -> Vec<PathBuf> {
        records.sort_by(|a, b| ranking.compare(a, b));
        records.into_iter().map(|record| record.path).collect()
    }

    #[rstest]
    #[case(7, 7)]
    #[case(1234, 1000)]
    #[case(1750, 2000)]
    #[case(95, 100)]
    #[case(4_480_000, 4_000_000)]
    fn test_round_to_one_figure(#[case] n: u64, #[case] expected: u64) {
        assert_eq!(round_to_one_figure(n), expected);
    }

    #[test]
    fn test_resolution_beats_everything() {
        let small = record("/a.jpg", 9_000_000, Metadata::new().with(MEGAPIXELS, 2.0));
        let large = record("/a-large-name.jpg", 1_000_000, Metadata::new().with(MEGAPIXELS, 12.0));
        assert_eq!(ranked(&Heuristic, vec![small, large]), [PathBuf::from("/a-large-name.jpg"), "/a.jpg".into()]);
    }

    #[test]
    fn test_similar_sizes_fall_through_to_dates() {
        let later = record("/later.jpg", 2_100_000, Metadata::new().with(DATE_TIME_ORIGINAL, "2019:01:01 00:00:00"));
        let earlier = record("/earlier.jpg", 1_900_000, Metadata::new().with(DATE_TIME_ORIGINAL, "2018:01:01 00:00:00"));
        let undated = record("/undated.jpg", 2_000_000, Metadata::new());
        assert_eq!(
            ranked(&Heuristic, vec![undated, later, earlier]),
            [PathBuf::from("/earlier.jpg"), "/later.jpg".into(), "/undated.jpg".into()]
        );
    }

    #[test]
    fn test_shorter_name_then_exact_size() {
        let copy = record("/IMG_0001 (1).jpg", 1000, Metadata::new());
        let smaller = record("/IMG_0001.jpg", 1000, Metadata::new());
        let bigger = record("/IMG_0002.jpg", 1040, Metadata::new());
        assert_eq!(
            ranked(&Heuristic, vec![copy, smaller, bigger]),
            [PathBuf::from("/IMG_0002.jpg"), "/IMG_0001.jpg".into(), "/IMG_0001 (1).jpg".into()]
        );
    }

    #[test]
    fn test_unranked_and_closures() {
        let records = vec![record("/b.jpg", 1, Metadata::new()), record("/a.jpg", 2, Metadata::new())];
        assert_eq!(ranked(&Unranked, records.clone()), [PathBuf::from("/b.jpg"), "/a.jpg".into()]);
        let by_path = |a: &FileRecord, b: &FileRecord| a.path.cmp(&b.path);
        assert_eq!(ranked(&by_path, records), [PathBuf::from("/a.jpg"), "/b.jpg".into()]);
    }
}
