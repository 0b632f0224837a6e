//! Destination folder layout

use crate::config::{FolderStructure, MediaKind};
use chrono::{Datelike, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Folder for files without any usable timestamp
pub const UNKNOWN_DATE_FOLDER: &str = "Unknown Date";

/// Subfolder of a date folder holding RAW files
pub const RAW_FOLDER: &str = "Raw";

/// Top-level folder for videos with `separate_videos`
pub const VIDEOS_FOLDER: &str = "Videos";

/// Relative folder for a date under the given structure
pub fn folder_for(date: Option<&NaiveDateTime>, structure: FolderStructure) -> PathBuf {
    let Some(date) = date else {
        return PathBuf::from(UNKNOWN_DATE_FOLDER);
    };

    let mut folder = PathBuf::new();
    match structure {
        FolderStructure::Day => {
            folder.push(date.format("%Y-%m-%d").to_string());
        }
        FolderStructure::MonthDay => {
            folder.push(format!("{}", date.year()));
            folder.push(date.format("%B").to_string());
            folder.push(format!("{:02}", date.day()));
        }
        FolderStructure::YearMonthDay => {
            folder.push(format!("{}", date.year()));
            folder.push(format!("{:02}", date.month()));
            folder.push(format!("{:02}", date.day()));
        }
        FolderStructure::YearMonth => {
            folder.push(format!("{}", date.year()));
            folder.push(format!("{:02}", date.month()));
        }
        FolderStructure::YearDay => {
            folder.push(format!("{}", date.year()));
            folder.push(format!("{:03}", date.ordinal()));
        }
    }
    folder
}

/// Absolute target directory of a file under `root`
///
/// RAW files nest under a `Raw` folder inside their date folder. With
/// `separate_videos`, videos skip the date folder and go to `root/Videos`.
pub fn target_dir(
    root: &Path,
    kind: MediaKind,
    date: Option<&NaiveDateTime>,
    structure: FolderStructure,
    separate_videos: bool,
) -> PathBuf {
    match kind {
        MediaKind::Video if separate_videos => root.join(VIDEOS_FOLDER),
        MediaKind::Raw => root
            .join(folder_for(date, structure))
            .join(RAW_FOLDER),
        _ => root.join(folder_for(date, structure)),
    }
}
