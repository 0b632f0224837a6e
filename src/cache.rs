//! Persistent metadata cache
//!
//! Two logical tables, stored together in one JSON file at the scanned root:
//! - fingerprint -> metadata blob (JSON with `date_taken`) + mod time at extraction
//! - path -> fingerprint + mod time
//!
//! A path entry is only trusted while the file's current modification time
//! equals the recorded one. An unreadable or corrupt cache file is treated as
//! an empty cache.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cache file name, created in the scanned root
pub const CACHE_FILENAME: &str = ".photo_metadata_cache.json";

/// File modification time as stored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModTime {
    pub secs: i64,
    pub nanos: u32,
}

impl ModTime {
    /// Read the modification time of a file
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(FileTime::from_last_modification_time(&metadata).into())
    }
}

impl From<FileTime> for ModTime {
    fn from(ft: FileTime) -> Self {
        Self {
            secs: ft.unix_seconds(),
            nanos: ft.nanoseconds(),
        }
    }
}

/// Metadata extracted once per unique content fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMetadata {
    /// Best-effort capture time; `None` when nothing could be read
    pub date_taken: Option<NaiveDateTime>,
}

/// Metadata entry keyed by fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataEntry {
    /// JSON-encoded `CachedMetadata`
    metadata_json: String,
    mod_time: ModTime,
}

/// Path index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PathEntry {
    fingerprint: String,
    mod_time: ModTime,
}

/// Result of a successful path lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub fingerprint: String,
    pub metadata: CachedMetadata,
}

/// Fingerprint-keyed metadata cache with a path index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataStore {
    /// Version for cache file format compatibility
    version: u32,

    /// fingerprint -> metadata
    metadata: HashMap<String, MetadataEntry>,

    /// path -> fingerprint
    paths: HashMap<PathBuf, PathEntry>,

    #[serde(skip)]
    dirty: bool,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// Current cache file format version
    const VERSION: u32 = 1;

    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            metadata: HashMap::new(),
            paths: HashMap::new(),
            dirty: false,
        }
    }

    /// Cache file location for a scanned root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CACHE_FILENAME)
    }

    /// Load the cache from a file; any failure yields an empty cache
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(?path, "Cache file does not exist, starting cold");
            return Self::new();
        }

        match Self::try_load(path) {
            Ok(store) => {
                info!(
                    paths = store.paths.len(),
                    fingerprints = store.metadata.len(),
                    "Loaded metadata cache"
                );
                store
            }
            Err(e) => {
                warn!(?path, error = %e, "Metadata cache unreadable, starting cold");
                Self::new()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::CacheFile(format!("Failed to open cache file: {}", e)))?;
        let reader = BufReader::new(file);

        let mut store: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::CacheFile(format!("Failed to parse cache file: {}", e)))?;

        if store.version != Self::VERSION {
            return Err(Error::CacheFile(format!(
                "Cache version {} does not match {}",
                store.version,
                Self::VERSION
            )));
        }

        // Drop path entries that point at missing metadata
        let before = store.paths.len();
        let metadata = &store.metadata;
        store
            .paths
            .retain(|_, entry| metadata.contains_key(&entry.fingerprint));
        if store.paths.len() != before {
            warn!(
                dropped = before - store.paths.len(),
                "Dropped cache paths without metadata"
            );
            store.dirty = true;
        }

        Ok(store)
    }

    /// Save the cache atomically (temp file + rename)
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| Error::CacheFile(format!("Failed to create temp cache file: {}", e)))?;
        let writer = BufWriter::new(file);

        serde_json::to_writer(writer, self)
            .map_err(|e| Error::CacheFile(format!("Failed to write cache file: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| Error::CacheFile(format!("Failed to rename temp cache file: {}", e)))?;

        self.dirty = false;
        debug!(?path, paths = self.paths.len(), "Saved metadata cache");
        Ok(())
    }

    /// Delete the cache file of a root, if any
    pub fn reset(root: &Path) -> Result<bool> {
        let path = Self::path_for(root);
        if path.exists() {
            fs::remove_file(&path)?;
            info!(?path, "Removed metadata cache");
            return Ok(true);
        }
        Ok(false)
    }

    /// Look up a path, reading its current modification time from disk
    pub fn lookup(&self, path: &Path) -> Option<CacheHit> {
        let mod_time = ModTime::of(path).ok()?;
        self.lookup_with_mod_time(path, mod_time)
    }

    /// Look up a path against an already-known modification time
    pub fn lookup_with_mod_time(&self, path: &Path, mod_time: ModTime) -> Option<CacheHit> {
        let entry = self.paths.get(path)?;
        if entry.mod_time != mod_time {
            debug!(?path, "Cache entry stale (modification time changed)");
            return None;
        }

        let meta = self.metadata.get(&entry.fingerprint)?;
        // Identical copies share the blob; a date read from another copy's mtime is not ours
        if meta.mod_time != mod_time {
            debug!(?path, "Cached metadata was stored for another copy");
            return None;
        }
        match serde_json::from_str::<CachedMetadata>(&meta.metadata_json) {
            Ok(metadata) => Some(CacheHit {
                fingerprint: entry.fingerprint.clone(),
                metadata,
            }),
            Err(e) => {
                warn!(?path, error = %e, "Cached metadata blob is corrupt");
                None
            }
        }
    }

    /// Upsert the metadata entry of a fingerprint and the index entry of a path
    pub fn store(
        &mut self,
        fingerprint: &str,
        date_taken: Option<NaiveDateTime>,
        path: &Path,
        mod_time: ModTime,
    ) -> Result<()> {
        // An empty fingerprint is the "unreadable" sentinel and is never cached
        if fingerprint.is_empty() {
            return Ok(());
        }

        let metadata_json = serde_json::to_string(&CachedMetadata { date_taken })?;
        self.metadata.insert(
            fingerprint.to_string(),
            MetadataEntry {
                metadata_json,
                mod_time,
            },
        );
        self.paths.insert(
            path.to_path_buf(),
            PathEntry {
                fingerprint: fingerprint.to_string(),
                mod_time,
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Drop the index entry of a path that no longer exists
    pub fn forget_path(&mut self, path: &Path) {
        if self.paths.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Remove path entries that are not in `current_paths`
    ///
    /// An empty `current_paths` is a no-op, so a scan that finds nothing does
    /// not wipe the index; use [`MetadataStore::clear_paths`] for that.
    /// Fingerprint entries left without any path are dropped too.
    pub fn prune_orphans(&mut self, current_paths: &HashSet<PathBuf>) -> usize {
        if current_paths.is_empty() {
            debug!("Empty scan, skipping cache prune");
            return 0;
        }

        let before = self.paths.len();
        self.paths.retain(|path, _| current_paths.contains(path));
        let removed = before - self.paths.len();

        self.drop_unreferenced_metadata();

        if removed > 0 {
            self.dirty = true;
            info!(removed, "Pruned stale cache paths");
        }
        removed
    }

    /// Remove every path entry and all metadata
    pub fn clear_paths(&mut self) {
        self.paths.clear();
        self.metadata.clear();
        self.dirty = true;
    }

    fn drop_unreferenced_metadata(&mut self) {
        let referenced: HashSet<String> =
            self.paths.values().map(|e| e.fingerprint.clone()).collect();
        let before = self.metadata.len();
        self.metadata.retain(|fp, _| referenced.contains(fp));
        if self.metadata.len() != before {
            self.dirty = true;
        }
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of indexed paths
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Number of distinct fingerprints
    pub fn fingerprint_count(&self) -> usize {
        self.metadata.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_lookup_requires_matching_mod_time() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"data").unwrap();
        let mod_time = ModTime::of(&file).unwrap();

        let mut store = MetadataStore::new();
        store.store("abc", Some(sample_date()), &file, mod_time).unwrap();

        let hit = store.lookup(&file).unwrap();
        assert_eq!(hit.fingerprint, "abc");
        assert_eq!(hit.metadata.date_taken, Some(sample_date()));

        filetime::set_file_mtime(&file, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        assert!(store.lookup(&file).is_none());
    }

    #[test]
    fn test_many_paths_share_one_fingerprint() {
        let mut store = MetadataStore::new();
        let mt = ModTime { secs: 5, nanos: 0 };
        store.store("fp", None, Path::new("/x/a.jpg"), mt).unwrap();
        store.store("fp", None, Path::new("/x/b.jpg"), mt).unwrap();

        assert_eq!(store.path_count(), 2);
        assert_eq!(store.fingerprint_count(), 1);
        let hit = store.lookup_with_mod_time(Path::new("/x/b.jpg"), mt).unwrap();
        assert_eq!(hit.metadata.date_taken, None);
    }

    #[test]
    fn test_copy_with_other_mod_time_misses() {
        let mut store = MetadataStore::new();
        let old = ModTime { secs: 100, nanos: 0 };
        let new = ModTime { secs: 200, nanos: 0 };
        store
            .store("fp", Some(sample_date()), Path::new("/x/a.mp4"), old)
            .unwrap();
        store.store("fp", None, Path::new("/x/b.mp4"), new).unwrap();

        // b's write replaced the shared blob; a must not see b's date
        assert!(store.lookup_with_mod_time(Path::new("/x/a.mp4"), old).is_none());
        let hit = store.lookup_with_mod_time(Path::new("/x/b.mp4"), new).unwrap();
        assert_eq!(hit.metadata.date_taken, None);
    }

    #[test]
    fn test_empty_fingerprint_not_cached() {
        let mut store = MetadataStore::new();
        let mt = ModTime { secs: 5, nanos: 0 };
        store.store("", None, Path::new("/x/a.jpg"), mt).unwrap();
        assert_eq!(store.path_count(), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_prune_orphans() {
        let mut store = MetadataStore::new();
        let mt = ModTime { secs: 1, nanos: 2 };
        store.store("fp1", None, Path::new("/r/a.jpg"), mt).unwrap();
        store.store("fp2", None, Path::new("/r/b.jpg"), mt).unwrap();

        let current: HashSet<PathBuf> = [PathBuf::from("/r/a.jpg")].into_iter().collect();
        assert_eq!(store.prune_orphans(&current), 1);
        assert_eq!(store.path_count(), 1);
        assert_eq!(store.fingerprint_count(), 1);
        assert!(store.lookup_with_mod_time(Path::new("/r/a.jpg"), mt).is_some());
    }

    #[test]
    fn test_prune_with_empty_scan_is_noop() {
        let mut store = MetadataStore::new();
        let mt = ModTime { secs: 1, nanos: 2 };
        store.store("fp1", None, Path::new("/r/a.jpg"), mt).unwrap();

        assert_eq!(store.prune_orphans(&HashSet::new()), 0);
        assert_eq!(store.path_count(), 1);

        store.clear_paths();
        assert_eq!(store.path_count(), 0);
        assert_eq!(store.fingerprint_count(), 0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache_path = MetadataStore::path_for(dir.path());
        let mt = ModTime { secs: 42, nanos: 7 };

        let mut store = MetadataStore::new();
        store
            .store("fp", Some(sample_date()), Path::new("/r/a.jpg"), mt)
            .unwrap();
        store.save(&cache_path).unwrap();
        assert!(!store.is_dirty());
        assert!(!cache_path.with_extension("tmp").exists());

        let loaded = MetadataStore::load(&cache_path);
        let hit = loaded.lookup_with_mod_time(Path::new("/r/a.jpg"), mt).unwrap();
        assert_eq!(hit.metadata.date_taken, Some(sample_date()));
    }

    #[test]
    fn test_corrupt_cache_starts_cold() {
        let dir = TempDir::new().unwrap();
        let cache_path = MetadataStore::path_for(dir.path());
        fs::write(&cache_path, b"{ not json").unwrap();

        let store = MetadataStore::load(&cache_path);
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_dangling_paths_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        let cache_path = MetadataStore::path_for(dir.path());
        fs::write(
            &cache_path,
            r#"{"version":1,"metadata":{},"paths":{"/r/a.jpg":{"fingerprint":"gone","mod_time":{"secs":1,"nanos":0}}}}"#,
        )
        .unwrap();

        let store = MetadataStore::load(&cache_path);
        assert_eq!(store.path_count(), 0);
        assert!(store.is_dirty());
    }

    #[test]
    fn test_reset_removes_file() {
        let dir = TempDir::new().unwrap();
        assert!(!MetadataStore::reset(dir.path()).unwrap());
        MetadataStore::new()
            .save(&MetadataStore::path_for(dir.path()))
            .unwrap();
        assert!(MetadataStore::reset(dir.path()).unwrap());
        assert!(!MetadataStore::path_for(dir.path()).exists());
    }
}
