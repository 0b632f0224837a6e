//! Maintenance operations outside the organize run
//!
//! Flattening a folder tree back into one directory, and normalizing
//! camera-style `IMG_<digits>` file names.

use crate::error::{Error, Result};
use crate::process::move_file;
use crate::scan::RESERVED_FILENAMES;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Move every file under `root` into `target`, then remove emptied subdirectories
///
/// Name collisions in `target` get a `_N` suffix. `target` may equal `root`
/// but may not be nested inside it, nor contain it.
pub fn flatten_folder_tree(root: &Path, target: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let root = std::path::absolute(root)?;
    let target = std::path::absolute(target)?;

    if root != target {
        if target.starts_with(&root) {
            return Err(Error::FlattenTarget {
                root,
                target,
                reason: "target is inside the root",
            });
        }
        if root.starts_with(&target) {
            return Err(Error::FlattenTarget {
                root,
                target,
                reason: "root is inside the target",
            });
        }
    }

    fs::create_dir_all(&target)?;

    let mut taken: HashSet<OsString> = fs::read_dir(&target)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();

    let mut moves = Vec::new();
    // Children before parents, so directories are empty by the time we reach them
    for entry in WalkDir::new(&root).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if path != root && fs::remove_dir(path).is_ok() {
                debug!(?path, "Removed empty directory");
            }
            continue;
        }
        if !entry.file_type().is_file() || path.parent() == Some(target.as_path()) {
            continue;
        }
        let name = entry.file_name();
        if is_reserved(name) {
            continue;
        }

        let candidate = unique_name(name, |n| taken.contains(n));
        let dest = target.join(&candidate);
        move_file(path, &dest)?;
        taken.insert(candidate);
        moves.push((path.to_path_buf(), dest));
    }

    info!(moved = moves.len(), ?root, ?target, "Flattened folder tree");
    Ok(moves)
}

/// Rename files whose stem contains `IMG_<digits>` to exactly `IMG_<digits>`
///
/// The extension is kept; collisions get a `_N` suffix. Returns the renames
/// performed as `(old, new)` pairs.
pub fn clean_img_filenames(folder: &Path, recursive: bool) -> Result<Vec<(PathBuf, PathBuf)>> {
    let pattern = Regex::new(r"IMG_(\d+)")?;
    let walker = WalkDir::new(folder).min_depth(1).follow_links(false);
    let walker = if recursive { walker } else { walker.max_depth(1) };

    // Listed up front so renamed files are not visited again
    let files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) if e.file_type().is_file() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<std::result::Result<_, _>>()?;

    let mut renames = Vec::new();
    for path in &files {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(captures) = pattern.captures(stem) else {
            continue;
        };
        let clean_stem = format!("IMG_{}", &captures[1]);
        if clean_stem == stem {
            continue;
        }

        let mut clean = OsString::from(&clean_stem);
        if let Some(ext) = path.extension() {
            clean.push(".");
            clean.push(ext);
        }
        let Some(parent) = path.parent() else {
            continue;
        };
        let new_name = unique_name(&clean, |n| parent.join(n).exists());
        let new_path = parent.join(new_name);

        fs::rename(path, &new_path)?;
        info!(from = ?path, to = ?new_path, "Renamed");
        renames.push((path.to_path_buf(), new_path));
    }

    Ok(renames)
}

fn is_reserved(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| RESERVED_FILENAMES.contains(&n))
}

/// First of `name`, `stem_1.ext`, `stem_2.ext`, ... that is not taken
fn unique_name(name: &OsStr, is_taken: impl Fn(&OsStr) -> bool) -> OsString {
    if !is_taken(name) {
        return name.to_os_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().unwrap_or(name);
    let extension = path.extension();

    let mut counter: u64 = 1;
    loop {
        let mut candidate = OsString::from(stem);
        candidate.push(format!("_{}", counter));
        if let Some(ext) = extension {
            candidate.push(".");
            candidate.push(ext);
        }
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flatten_moves_all_files_and_removes_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sorted");
        let target = dir.path().join("flat");
        fs::create_dir_all(root.join("2021-05-01/Raw")).unwrap();
        fs::create_dir_all(root.join("2022-01-01")).unwrap();
        fs::write(root.join("2021-05-01/a.jpg"), b"a").unwrap();
        fs::write(root.join("2021-05-01/Raw/a.cr2"), b"raw").unwrap();
        fs::write(root.join("2022-01-01/a.jpg"), b"other a").unwrap();

        let moves = flatten_folder_tree(&root, &target).unwrap();

        assert_eq!(moves.len(), 3);
        assert!(target.join("a.cr2").exists());
        assert!(target.join("a.jpg").exists());
        assert!(target.join("a_1.jpg").exists());
        assert!(root.exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_flatten_keeps_mtime_and_existing_target_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sorted");
        let target = dir.path().join("flat");
        fs::create_dir_all(root.join("2020-01-01")).unwrap();
        fs::create_dir_all(&target).unwrap();
        let src = root.join("2020-01-01/a.jpg");
        fs::write(&src, b"incoming").unwrap();
        fs::write(target.join("a.jpg"), b"already here").unwrap();
        let mtime = filetime::FileTime::from_unix_time(1_300_000_000, 0);
        filetime::set_file_mtime(&src, mtime).unwrap();

        flatten_folder_tree(&root, &target).unwrap();

        assert_eq!(fs::read(target.join("a.jpg")).unwrap(), b"already here");
        let moved = target.join("a_1.jpg");
        assert_eq!(fs::read(&moved).unwrap(), b"incoming");
        let meta = fs::metadata(&moved).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), mtime);
    }

    #[test]
    fn test_flatten_into_root_itself() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("2021-05-01")).unwrap();
        fs::write(dir.path().join("keep.jpg"), b"k").unwrap();
        fs::write(dir.path().join("2021-05-01/b.jpg"), b"b").unwrap();

        let moves = flatten_folder_tree(dir.path(), dir.path()).unwrap();

        assert_eq!(moves.len(), 1);
        assert!(dir.path().join("keep.jpg").exists());
        assert!(dir.path().join("b.jpg").exists());
        assert!(!dir.path().join("2021-05-01").exists());
    }

    #[test]
    fn test_flatten_rejects_nested_target() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("inner");

        assert!(matches!(
            flatten_folder_tree(dir.path(), &inner),
            Err(Error::FlattenTarget { .. })
        ));
        assert!(matches!(
            flatten_folder_tree(&inner, dir.path()),
            Err(Error::FlattenTarget { .. })
        ));
    }

    #[test]
    fn test_flatten_sibling_with_common_prefix_is_allowed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("photos");
        let target = dir.path().join("photos_flat");
        fs::create_dir_all(root.join("x")).unwrap();
        fs::write(root.join("x/a.jpg"), b"a").unwrap();

        flatten_folder_tree(&root, &target).unwrap();
        assert!(target.join("a.jpg").exists());
    }

    #[test]
    fn test_clean_img_filenames() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("copy of IMG_1234 (2).jpg"), b"1").unwrap();
        fs::write(dir.path().join("IMG_1234.jpg"), b"0").unwrap();
        fs::write(dir.path().join("IMG_0001.jpg"), b"clean").unwrap();
        fs::write(dir.path().join("holiday.jpg"), b"h").unwrap();
        fs::write(dir.path().join("sub/edited_IMG_42.png"), b"s").unwrap();

        let renames = clean_img_filenames(dir.path(), true).unwrap();

        assert_eq!(renames.len(), 2);
        assert!(dir.path().join("IMG_1234_1.jpg").exists());
        assert!(dir.path().join("IMG_0001.jpg").exists());
        assert!(dir.path().join("holiday.jpg").exists());
        assert!(dir.path().join("sub/IMG_42.png").exists());
    }

    #[test]
    fn test_clean_img_filenames_not_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("x_IMG_7.jpg"), b"1").unwrap();
        fs::write(dir.path().join("sub/x_IMG_8.jpg"), b"2").unwrap();

        let renames = clean_img_filenames(dir.path(), false).unwrap();

        assert_eq!(renames.len(), 1);
        assert!(dir.path().join("IMG_7.jpg").exists());
        assert!(dir.path().join("sub/x_IMG_8.jpg").exists());
    }

    #[test]
    fn test_unique_name() {
        let taken: HashSet<OsString> = ["a.jpg", "a_1.jpg"].iter().map(OsString::from).collect();
        assert_eq!(unique_name(OsStr::new("b.jpg"), |n| taken.contains(n)), "b.jpg");
        assert_eq!(unique_name(OsStr::new("a.jpg"), |n| taken.contains(n)), "a_2.jpg");
    }
}
