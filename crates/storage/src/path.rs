//! Path normalization utilities.
//!
//! Every path stored in the cache or compared against the library root goes
//! through [`normalize`] first, so two spellings of the same location always
//! compare equal. Normalization is lexical; symlinks are not resolved.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a relative path (such as a computed hierarchy directory) and
/// resolves `.` and `..` components without leaving the root it will be
/// joined onto.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shashin_storage::validate_path;
/// assert!(validate_path("2018/10/21").is_ok());
/// assert!(validate_path("2018/../2019").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("/absolute").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(validate_path("2018/./10//21/").unwrap(), Path::new("2018/10/21"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir => {},
            Component::RootDir | Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Turns any path into an absolute path with `.` and `..` folded away.
///
/// Relative paths are resolved against the current working directory.
pub fn normalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    let absolute = std::path::absolute(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                // `pop()` refuses to remove the root, so `/..` stays `/`.
                normalized.pop();
            },
            Component::CurDir => {},
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Returns `true` if `path` is located anywhere below `parent`.
///
/// Both arguments are expected to be normalized already. A path is not
/// considered a child of itself.
pub fn is_child(parent: impl AsRef<Path>, path: impl AsRef<Path>) -> bool {
    let (parent, path) = (parent.as_ref(), path.as_ref());
    path != parent && path.starts_with(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2018/10/21", "2018/10/21")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("a/b/..", "a")]
    #[case("2018/10/21/", "2018/10/21")]
    fn test_valid_relative_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("/2018/10/21")]
    #[case("a\0b")]
    fn test_invalid_relative_paths(#[case] input: &str) {
        assert!(validate(input).is_err());
    }

    #[test]
    fn test_normalize_folds_components() {
        assert_eq!(normalize("/lib/./2018/../2019//a.jpg").unwrap(), Path::new("/lib/2019/a.jpg"));
        assert_eq!(normalize("/..").unwrap(), Path::new("/"));
    }

    #[test]
    fn test_normalize_makes_relative_paths_absolute() {
        let normalized = normalize("some/file.jpg").unwrap();
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("some/file.jpg"));
    }

    #[test]
    fn test_normalize_rejects_empty_path() {
        assert!(normalize("").is_err());
    }

    #[rstest]
    #[case("/lib", "/lib/2018/a.jpg", true)]
    #[case("/lib", "/lib", false)]
    #[case("/lib", "/library/a.jpg", false)]
    #[case("/lib/2018", "/lib/a.jpg", false)]
    fn test_is_child(#[case] parent: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_child(parent, path), expected);
    }
}
