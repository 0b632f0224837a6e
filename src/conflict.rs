//! Destination conflict resolution
//!
//! Given a wanted destination and a source file, decide whether the file can
//! go there as-is, needs a `_N` suffix, or is already present (same bytes).

use crate::error::{Error, Result};
use crate::hash::{quick_fingerprint, same_content};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of resolving a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Destination is free
    UseAsIs(PathBuf),
    /// Destination taken by different content; use this suffixed path
    UseRenamed(PathBuf),
    /// Identical content already lives at this path
    Duplicate(PathBuf),
}

impl Resolution {
    /// Destination to move to, if any
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Resolution::UseAsIs(p) | Resolution::UseRenamed(p) => Some(p),
            Resolution::Duplicate(_) => None,
        }
    }
}

/// Resolve `dest` for `source` against the file system only
pub fn resolve(dest: &Path, source: &Path) -> Result<Resolution> {
    resolve_with_claims(dest, source, &quick_fingerprint(source), |_| false)
}

/// Resolve `dest` for `source`, also treating paths claimed in this run as taken
///
/// A claimed path that is not on disk yet cannot be compared, so it only
/// pushes the search to the next suffix. A path on disk is always compared
/// by content, claimed or not. The counter grows every iteration, so the
/// search ends at the first free name.
pub fn resolve_with_claims(
    dest: &Path,
    source: &Path,
    source_fingerprint: &str,
    is_claimed: impl Fn(&Path) -> bool,
) -> Result<Resolution> {
    match check_candidate(dest, source, source_fingerprint, &is_claimed) {
        Candidate::Free => return Ok(Resolution::UseAsIs(dest.to_path_buf())),
        Candidate::Identical => return Ok(Resolution::Duplicate(dest.to_path_buf())),
        Candidate::Taken => {}
    }

    let stem = dest.file_stem().ok_or_else(|| Error::InvalidFileName {
        path: dest.to_path_buf(),
    })?;
    let extension = dest.extension();
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));

    let mut counter: u64 = 1;
    loop {
        let mut name = OsString::from(stem);
        name.push(format!("_{}", counter));
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }
        let candidate = parent.join(name);

        match check_candidate(&candidate, source, source_fingerprint, &is_claimed) {
            Candidate::Free => {
                debug!(?dest, ?candidate, "Resolved name conflict");
                return Ok(Resolution::UseRenamed(candidate));
            }
            Candidate::Identical => return Ok(Resolution::Duplicate(candidate)),
            Candidate::Taken => counter += 1,
        }
    }
}

enum Candidate {
    Free,
    Identical,
    Taken,
}

fn check_candidate(
    candidate: &Path,
    source: &Path,
    source_fingerprint: &str,
    is_claimed: &impl Fn(&Path) -> bool,
) -> Candidate {
    if candidate.exists() {
        if same_content(candidate, source, source_fingerprint) {
            Candidate::Identical
        } else {
            Candidate::Taken
        }
    } else if is_claimed(candidate) {
        Candidate::Taken
    } else {
        Candidate::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.jpg");
        fs::write(&src, b"abc").unwrap();
        let dest = dir.path().join("out/src.jpg");

        assert_eq!(resolve(&dest, &src).unwrap(), Resolution::UseAsIs(dest));
    }

    #[test]
    fn test_identical_destination_is_duplicate() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.jpg");
        let dest = dir.path().join("dest.jpg");
        fs::write(&src, b"same bytes").unwrap();
        fs::write(&dest, b"same bytes").unwrap();

        let resolution = resolve(&dest, &src).unwrap();
        assert_eq!(resolution, Resolution::Duplicate(dest));
        assert!(resolution.destination().is_none());
    }

    #[test]
    fn test_different_content_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src/photo.jpg");
        let dest = dir.path().join("photo.jpg");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();
        fs::write(dir.path().join("photo_1.jpg"), b"older").unwrap();

        assert_eq!(
            resolve(&dest, &src).unwrap(),
            Resolution::UseRenamed(dir.path().join("photo_2.jpg"))
        );
    }

    #[test]
    fn test_identical_suffixed_file_is_duplicate() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src/photo.jpg");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"payload").unwrap();
        fs::write(dir.path().join("photo.jpg"), b"other").unwrap();
        fs::write(dir.path().join("photo_1.jpg"), b"payload").unwrap();

        assert_eq!(
            resolve(&dir.path().join("photo.jpg"), &src).unwrap(),
            Resolution::Duplicate(dir.path().join("photo_1.jpg"))
        );
    }

    #[test]
    fn test_claimed_names_are_skipped() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.jpg");
        fs::write(&src, b"abc").unwrap();
        let dest = dir.path().join("out/a.jpg");

        let claimed: HashSet<PathBuf> = [dest.clone(), dir.path().join("out/a_1.jpg")]
            .into_iter()
            .collect();
        let resolution =
            resolve_with_claims(&dest, &src, &quick_fingerprint(&src), |p| claimed.contains(p))
                .unwrap();
        assert_eq!(resolution, Resolution::UseRenamed(dir.path().join("out/a_2.jpg")));
    }

    #[test]
    fn test_no_extension() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("README");
        fs::write(&src, b"1").unwrap();
        fs::write(&dest, b"2").unwrap();

        assert_eq!(
            resolve(&dest, &src).unwrap(),
            Resolution::UseRenamed(dir.path().join("README_1"))
        );
    }
}
