mod file;

pub(crate) use self::file::FileRow;
pub use self::file::{DuplicateGroup, FileRecord, Upsert};
