//! Where a file belongs in the library, derived from its own metadata.
//!
//! A hierarchy is written as one or two metadata date tags separated by `|`,
//! e.g. `DateTimeOriginal|FileModifyDate`. The first tag holding a usable
//! calendar date decides the file's directory, always laid out as
//! `YYYY/MM/DD`.

use exn::{OptionExt, ResultExt};
use serde::{Deserialize, Serialize};
use shashin_extract::Metadata;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::{Error, ErrorKind, Result};

/// Capture date first, then whatever the filesystem says.
pub const DEFAULT_HIERARCHY: &str = "DateTimeOriginal|FileModifyDate";

const DATE_PATH: &[BorrowedFormatItem<'_>] = format_description!("[year]/[month]/[day]");
const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hierarchy {
    primary: String,
    fallback: Option<String>,
}

impl Hierarchy {
    /// The date tags in the order they are tried.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallback.as_deref())
    }

    /// The first date any of the tags resolves to.
    pub fn date(&self, metadata: &Metadata) -> Option<Date> {
        self.tags().find_map(|tag| metadata.date(tag))
    }

    /// The directory, relative to the library root, that a file with this
    /// metadata belongs in.
    ///
    /// Fails with [`ErrorKind::Undated`] rather than guessing when no tag
    /// resolves.
    pub fn destination(&self, metadata: &Metadata) -> Result<PathBuf> {
        let date = self.date(metadata).ok_or_raise(|| ErrorKind::Undated(self.to_string()))?;
        let relative = date.format(DATE_PATH).or_raise(|| ErrorKind::Undated(self.to_string()))?;
        Ok(PathBuf::from(relative))
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self { primary: "DateTimeOriginal".into(), fallback: Some("FileModifyDate".into()) }
    }
}

fn is_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for Hierarchy {
    type Err = Error;

    fn from_str(expression: &str) -> Result<Self> {
        let invalid = || ErrorKind::Hierarchy(expression.to_string());
        let mut tags = expression.split(SEPARATOR).map(str::trim);
        let primary = tags.next().filter(|tag| is_tag(tag)).ok_or_raise(invalid)?;
        let fallback = match tags.next() {
            Some(tag) if is_tag(tag) => Some(tag.to_string()),
            Some(_) => exn::bail!(invalid()),
            None => None,
        };
        exn::ensure!(tags.next().is_none(), invalid());
        Ok(Self { primary: primary.to_string(), fallback })
    }
}

impl TryFrom<String> for Hierarchy {
    type Error = Error;

    fn try_from(expression: String) -> Result<Self> {
        expression.parse()
    }
}

impl From<Hierarchy> for String {
    fn from(hierarchy: Hierarchy) -> Self {
        hierarchy.to_string()
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.primary)?;
        if let Some(fallback) = &self.fallback {
            write!(f, "{SEPARATOR}{fallback}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shashin_extract::consts::{DATE_TIME_ORIGINAL, FILE_MODIFY_DATE};

    #[test]
    fn test_default_matches_constant() {
        assert_eq!(Hierarchy::default().to_string(), DEFAULT_HIERARCHY);
        assert_eq!(DEFAULT_HIERARCHY.parse::<Hierarchy>().unwrap(), Hierarchy::default());
    }

    #[rstest]
    #[case("DateTimeOriginal", "DateTimeOriginal")]
    #[case(" CreateDate | FileModifyDate ", "CreateDate|FileModifyDate")]
    #[case("Date_Time-Original", "Date_Time-Original")]
    fn test_parse_valid(#[case] expression: &str, #[case] display: &str) {
        assert_eq!(expression.parse::<Hierarchy>().unwrap().to_string(), display);
    }

    #[rstest]
    #[case("")]
    #[case("|FileModifyDate")]
    #[case("DateTimeOriginal|")]
    #[case("A|B|C")]
    #[case("{{ DateTimeOriginal }}")]
    #[case("EXIF:DateTimeOriginal")]
    fn test_parse_invalid(#[case] expression: &str) {
        let err = expression.parse::<Hierarchy>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Hierarchy(e) if e == expression));
    }

    #[rstest]
    #[case::primary("2018:10:21 14:03:22", "2019:01:01 00:00:00", "2018/10/21")]
    #[case::fallback("0000:00:00 00:00:00", "2019:01:02 10:00:00+01:00", "2019/01/02")]
    #[case::malformed_primary("not a date", "2019-03-04", "2019/03/04")]
    fn test_destination(#[case] original: &str, #[case] modified: &str, #[case] expected: &str) {
        let metadata = Metadata::new().with(DATE_TIME_ORIGINAL, original).with(FILE_MODIFY_DATE, modified);
        assert_eq!(Hierarchy::default().destination(&metadata).unwrap(), PathBuf::from(expected));
    }

    #[test]
    fn test_destination_pads_components() {
        let metadata = Metadata::new().with(DATE_TIME_ORIGINAL, "0987:03:04 00:00:00");
        assert_eq!(Hierarchy::default().destination(&metadata).unwrap(), PathBuf::from("0987/03/04"));
    }

    #[test]
    fn test_undated_is_an_error() {
        let metadata = Metadata::new().with(DATE_TIME_ORIGINAL, "0000:00:00 00:00:00");
        let err = Hierarchy::default().destination(&metadata).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Undated(tags) if tags == DEFAULT_HIERARCHY));
    }

    #[test]
    fn test_single_tag_has_no_fallback() {
        let hierarchy: Hierarchy = "DateTimeOriginal".parse().unwrap();
        let metadata = Metadata::new().with(FILE_MODIFY_DATE, "2019:01:02 10:00:00");
        assert!(hierarchy.destination(&metadata).is_err());
    }
}
