//! Error types for the photo sorter

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for photo sorter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the photo sorter
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("Failed to read RAW metadata from {path}: {message}")]
    RawMetadata { path: PathBuf, message: String },

    #[error("Metadata cache error: {0}")]
    CacheFile(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file name: {path}")]
    InvalidFileName { path: PathBuf },

    #[error("Refusing to flatten {root} into {target}: {reason}")]
    FlattenTarget {
        root: PathBuf,
        target: PathBuf,
        reason: &'static str,
    },

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),
}
