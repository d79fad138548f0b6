//! Node path helpers.
//!
//! The service namespace is a rooted tree addressed by absolute,
//! slash-separated paths. Operations validate paths before any native call so
//! malformed input fails fast with [`Error::BadArguments`].

use crate::error::{Error, Result};

/// Validate an absolute node path.
///
/// A path must start with `/` and must not end with one, except for the root
/// itself.
pub fn validate(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::BadArguments);
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(Error::BadArguments);
    }
    Ok(())
}

/// The parent of a node path. The parent of root is root itself.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// The final path segment.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Extract the server-assigned numeric suffix of a sequential node name.
///
/// Returns `None` when the name carries no trailing decimal digits.
pub fn sequence_suffix(path: &str) -> Option<u64> {
    let digits = path
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    path[path.len() - digits..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_absolute_paths() {
        assert!(validate("/").is_ok());
        assert!(validate("/a").is_ok());
        assert!(validate("/a/b/c").is_ok());
    }

    #[test]
    fn validate_rejects_malformed_paths() {
        assert_eq!(validate(""), Err(Error::BadArguments));
        assert_eq!(validate("a/b"), Err(Error::BadArguments));
        assert_eq!(validate("/a/"), Err(Error::BadArguments));
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent("/"), "/");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/a/b"), "/a");
        assert_eq!(parent("/a/b/c"), "/a/b");
    }

    #[test]
    fn basename_segments() {
        assert_eq!(basename("/a/b"), "b");
        assert_eq!(basename("/a"), "a");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn sequence_suffixes() {
        assert_eq!(sequence_suffix("/elect/candidate0000000003"), Some(3));
        assert_eq!(sequence_suffix("/elect/candidate0000000142"), Some(142));
        assert_eq!(sequence_suffix("/elect/candidate"), None);
        assert_eq!(sequence_suffix("/plain"), None);
    }
}
