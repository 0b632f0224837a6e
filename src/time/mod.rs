//! Date-taken extraction
//!
//! First success wins:
//! 1. EXIF tags of photos (JPEG/PNG containers)
//! 2. EXIF tags of RAW files read as TIFF containers
//! 3. RAW header reader for vendor TIFF variants (ORF, RW2)
//! 4. File system modification time, as local time
//!
//! A file whose modification time cannot be read has no date at all and is
//! sorted into the "Unknown Date" folder.

pub mod exif;
pub mod raw;

use crate::config::MediaKind;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Source of the extracted timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Extracted from EXIF metadata
    Exif,
    /// Extracted by the RAW header reader
    RawMetadata,
    /// From file system modification time
    FileSystem,
}

/// Result of timestamp extraction
#[derive(Debug, Clone)]
pub struct ExtractedTime {
    /// The extracted timestamp
    pub timestamp: NaiveDateTime,
    /// Source of the timestamp
    pub source: TimeSource,
}

/// Extract the date taken of a media file
///
/// Never fails: metadata errors degrade to the modification time, and an
/// unreadable file yields `None`.
pub fn date_taken(path: &Path, kind: MediaKind) -> Option<ExtractedTime> {
    match kind {
        MediaKind::Photo | MediaKind::Raw => {
            match exif::extract_exif_time(path) {
                Ok(time) => {
                    debug!(?path, "Extracted time from EXIF");
                    return Some(ExtractedTime {
                        timestamp: time,
                        source: TimeSource::Exif,
                    });
                }
                Err(e) => debug!(?path, error = %e, "No EXIF time found"),
            }

            if kind == MediaKind::Raw {
                match raw::extract_raw_time(path) {
                    Ok(time) => {
                        debug!(?path, "Extracted time from RAW header");
                        return Some(ExtractedTime {
                            timestamp: time,
                            source: TimeSource::RawMetadata,
                        });
                    }
                    Err(e) => debug!(?path, error = %e, "No RAW header time found"),
                }
            }
        }
        MediaKind::Video => {}
    }

    modification_time(path).map(|timestamp| ExtractedTime {
        timestamp,
        source: TimeSource::FileSystem,
    })
}

/// File system modification time converted to local time
pub fn modification_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_time_source_debug() {
        assert_eq!(format!("{:?}", TimeSource::Exif), "Exif");
        assert_eq!(format!("{:?}", TimeSource::RawMetadata), "RawMetadata");
        assert_eq!(format!("{:?}", TimeSource::FileSystem), "FileSystem");
    }

    #[test]
    fn test_photo_with_exif() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, exif::tests::jpeg_with_exif("2021:05:01 10:00:00")).unwrap();

        let time = date_taken(&path, MediaKind::Photo).unwrap();
        assert_eq!(time.source, TimeSource::Exif);
        assert_eq!(
            time.timestamp,
            NaiveDate::from_ymd_opt(2021, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_corrupt_photo_falls_back_to_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not an image").unwrap();

        let time = date_taken(&path, MediaKind::Photo).unwrap();
        assert_eq!(time.source, TimeSource::FileSystem);
        assert_eq!(Some(time.timestamp), modification_time(&path));
    }

    #[test]
    fn test_video_uses_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        // Even a valid EXIF payload is ignored for videos
        fs::write(&path, exif::tests::jpeg_with_exif("2021:05:01 10:00:00")).unwrap();

        let time = date_taken(&path, MediaKind::Video).unwrap();
        assert_eq!(time.source, TimeSource::FileSystem);
    }

    #[test]
    fn test_missing_file_has_no_date() {
        let dir = TempDir::new().unwrap();
        assert!(date_taken(&dir.path().join("gone.nef"), MediaKind::Raw).is_none());
    }
}
