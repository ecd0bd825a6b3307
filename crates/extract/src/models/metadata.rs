use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Date, Month};

use crate::consts;
use crate::error::{ErrorKind, Result};

/// Everything a metadata provider reported about one file.
///
/// The map itself is opaque and kept verbatim (it is what gets cached);
/// accessors below interpret the handful of tags organizing and ranking rely
/// on, each returning `None` when the tag is missing or unusable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.0.get(tag)
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(tag.into(), value.into());
        self
    }

    /// Builder-style [`insert`](Self::insert), handy for fixtures.
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(tag, value);
        self
    }

    /// A tag's value as a non-empty string.
    pub fn str(&self, tag: &str) -> Option<&str> {
        self.get(tag).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    /// A tag's value as a number, accepting numeric strings as well.
    pub fn number(&self, tag: &str) -> Option<f64> {
        match self.get(tag)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Drop `exiftool` group prefixes (`EXIF:DateTimeOriginal` becomes
    /// `DateTimeOriginal`). When two groups carry the same tag the later one
    /// wins.
    pub fn strip_groups(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(key, value)| match key.rsplit_once(':') {
                    Some((_, tag)) => (tag.to_string(), value),
                    None => (key, value),
                })
                .collect(),
        )
    }

    pub fn source_file(&self) -> Option<&str> {
        self.str(consts::SOURCE_FILE)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.str(consts::MIME_TYPE)
    }

    pub fn file_type(&self) -> Option<&str> {
        self.str(consts::FILE_TYPE)
    }

    /// Only images get a perceptual hash.
    pub fn is_image(&self) -> bool {
        self.mime_type().is_some_and(|mime| mime.starts_with("image/"))
    }

    /// The provider's own complaint about the file, if it had one.
    pub fn error(&self) -> Option<&str> {
        self.str(consts::ERROR)
    }

    /// Calendar date of a date-valued tag.
    ///
    /// Accepts EXIF `YYYY:MM:DD HH:MM:SS[+TZ]` as well as ISO `YYYY-MM-DD`.
    /// Time and timezone are ignored. Placeholder dates that cameras write
    /// when their clock was never set (`0000:00:00`) count as missing.
    pub fn date(&self, tag: &str) -> Option<Date> {
        parse_date(self.str(tag)?)
    }

    /// Image resolution in megapixels, derived from the dimensions when the
    /// provider did not compute it.
    pub fn megapixels(&self) -> Option<f64> {
        self.number(consts::MEGAPIXELS).or_else(|| {
            let width = self.number(consts::IMAGE_WIDTH)?;
            let height = self.number(consts::IMAGE_HEIGHT)?;
            Some(width * height / 1_000_000.0)
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).or_raise(|| ErrorKind::InvalidData("metadata is not serializable".into()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData("cached metadata is not a JSON object".into()))
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn parse_date(value: &str) -> Option<Date> {
    let date = value.get(..10)?;
    let mut parts = date.split([':', '-']);
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || year == 0 {
        return None;
    }
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}
