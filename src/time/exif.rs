//! EXIF time extraction for photos and TIFF-based RAW files

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{Context, Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// Tag 0x9005 in the Exif IFD, written by some older cameras as a last-resort date
const LEGACY_DATE_TAG: Tag = Tag(Context::Exif, 0x9005);

/// EXIF tags to try for date extraction, in priority order
pub(crate) const DATE_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal,  // When the original image was taken
    Tag::DateTime,          // File change date/time
    Tag::DateTimeDigitized, // When the image was digitized
    LEGACY_DATE_TAG,
];

/// EXIF date format: "YYYY:MM:DD HH:MM:SS"
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Extract the capture time from EXIF metadata
pub fn extract_exif_time(path: &Path) -> Result<NaiveDateTime> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    first_date_tag(&exif).ok_or_else(|| Error::ExifRead {
        path: path.to_path_buf(),
        message: "No valid date tag found in EXIF data".to_string(),
    })
}

/// Try each date tag in priority order; malformed values are skipped
pub(crate) fn first_date_tag(exif: &Exif) -> Option<NaiveDateTime> {
    for tag in DATE_TAGS {
        let Some(field) = exif.get_field(*tag, In::PRIMARY) else {
            continue;
        };
        if let Value::Ascii(ref values) = field.value
            && let Some(datetime) = values.iter().find_map(|v| parse_exif_datetime(v))
        {
            trace!(?tag, %datetime, "Found EXIF date");
            return Some(datetime);
        }
    }
    None
}

/// Parse a raw EXIF ASCII value in `YYYY:MM:DD HH:MM:SS` form
fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let s = std::str::from_utf8(raw).ok()?;
    let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(s, EXIF_FORMAT).ok()
}
