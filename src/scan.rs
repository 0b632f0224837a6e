//! Directory scanning
//!
//! Walks the root iteratively (walkdir keeps its own stack), prunes excluded
//! subtrees before descending, and yields media files by extension.

use crate::cache::CACHE_FILENAME;
use crate::config::MediaKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Log file written into the scanned root by the CLI
pub const LOG_FILENAME: &str = "photo_organizer_log.txt";

/// Files the scanner never yields, whatever their extension
pub const RESERVED_FILENAMES: &[&str] = &[LOG_FILENAME, CACHE_FILENAME];

/// A media file found by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Lazily scan `root` for media files
///
/// `excluded` must hold absolute paths; a directory equal to or nested under
/// one of them is skipped with everything below it. Matching is done per path
/// component, so `/photos/keep` does not exclude `/photos/keeper`.
pub fn scan<'a>(root: &Path, excluded: &'a [PathBuf]) -> impl Iterator<Item = ScannedFile> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |e| !is_excluded(e, excluded))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            if is_reserved(&path) {
                return None;
            }
            let kind = MediaKind::from_path(&path)?;
            Some(ScannedFile { path, kind })
        })
}

fn is_excluded(entry: &DirEntry, excluded: &[PathBuf]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let path = entry.path();
    match excluded.iter().find(|ex| path.starts_with(ex)) {
        Some(ex) => {
            debug!(?path, excluded = ?ex, "Excluding directory");
            true
        }
        None => false,
    }
}

fn is_reserved(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| RESERVED_FILENAMES.contains(&name))
}
