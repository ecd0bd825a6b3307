//! Tag names as reported by `exiftool` once group prefixes are stripped.

pub const SOURCE_FILE: &str = "SourceFile";
pub const MIME_TYPE: &str = "MIMEType";
pub const FILE_TYPE: &str = "FileType";
pub const DATE_TIME_ORIGINAL: &str = "DateTimeOriginal";
pub const FILE_MODIFY_DATE: &str = "FileModifyDate";
pub const MEGAPIXELS: &str = "Megapixels";
pub const IMAGE_WIDTH: &str = "ImageWidth";
pub const IMAGE_HEIGHT: &str = "ImageHeight";
/// Set by `exiftool` instead of real tags when it cannot process a file.
pub const ERROR: &str = "Error";
