//! Configuration types for the photo sorter

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Photo extensions read as images (EXIF container)
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Camera RAW extensions
pub const RAW_EXTENSIONS: &[&str] = &["cr2", "nef", "arw", "dng", "orf", "rw2"];

/// Video extensions
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "mts", "m2ts", "wmv"];

/// Default upper bound for move workers when none is configured
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Upper bound for metadata extraction workers
pub const MAX_EXTRACT_WORKERS: usize = 4;

/// Folder layout used for the date-derived hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FolderStructure {
    /// YYYY-MM-DD/
    #[default]
    Day,
    /// YYYY/MonthName/DD/
    MonthDay,
    /// YYYY/MM/DD/
    YearMonthDay,
    /// YYYY/MM/
    YearMonth,
    /// YYYY/DDD/ (day of year)
    YearDay,
}

/// Media category, derived once per file from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Photo files (jpg, jpeg, png)
    Photo,
    /// Camera RAW files, nested under a Raw folder
    Raw,
    /// Video files
    Video,
}

impl MediaKind {
    /// Classify a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if RAW_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Raw)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Classify a path by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Configuration consumed by the organizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory that is scanned and organized in place
    pub base_dir: PathBuf,

    /// Folder layout for dated files
    #[serde(default)]
    pub folder_structure: FolderStructure,

    /// Number of move workers (0 = auto)
    #[serde(default)]
    pub max_workers: usize,

    /// Put all videos in a flat top-level Videos folder
    #[serde(default)]
    pub separate_videos: bool,

    /// Subtrees that are never scanned
    #[serde(default)]
    pub excluded_folders: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            folder_structure: FolderStructure::default(),
            max_workers: 0,
            separate_videos: false,
            excluded_folders: vec![],
        }
    }
}

impl Config {
    /// Create a configuration for a base directory with default settings
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Reject configurations that cannot start a run
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::Config("No base directory given".into()));
        }
        if !self.base_dir.exists() {
            return Err(Error::Config(format!(
                "Base directory does not exist: {}",
                self.base_dir.display()
            )));
        }
        if !self.base_dir.is_dir() {
            return Err(Error::Config(format!(
                "Base directory is not a directory: {}",
                self.base_dir.display()
            )));
        }
        Ok(())
    }

    /// Absolute base directory
    pub fn absolute_base_dir(&self) -> Result<PathBuf> {
        Ok(std::path::absolute(&self.base_dir)?)
    }

    /// Excluded folders as absolute paths; relative entries are taken relative to the base dir
    pub fn absolute_excluded_folders(&self) -> Result<Vec<PathBuf>> {
        let base = self.absolute_base_dir()?;
        self.excluded_folders
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    Ok(std::path::absolute(p)?)
                } else {
                    Ok(std::path::absolute(base.join(p))?)
                }
            })
            .collect()
    }

    /// Move worker count: configured value (or the default cap), bounded by available cores
    pub fn move_workers(&self) -> usize {
        let requested = if self.max_workers == 0 {
            DEFAULT_MAX_WORKERS
        } else {
            self.max_workers
        };
        requested.min(available_cores()).max(1)
    }

    /// Extraction worker count: min(cores, 4)
    pub fn extract_workers(&self) -> usize {
        available_cores().min(MAX_EXTRACT_WORKERS).max(1)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
