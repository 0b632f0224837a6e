//! RAW header reader
//!
//! Olympus ORF and Panasonic RW2 files are TIFF structures with a vendor magic
//! number, so generic container detection rejects them. This reader patches
//! the magic back to TIFF's 42 and parses the IFDs directly, then reads the
//! capture time in its rendered `YYYY-MM-DD HH:MM:SS` form.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag};
use std::fs;
use std::path::Path;
use tracing::trace;

/// Rendered date format of the RAW reader
const RAW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tags holding the capture time, in priority order
const RAW_DATE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTime];

/// Extract the capture time of a RAW file from its TIFF header
pub fn extract_raw_time(path: &Path) -> Result<NaiveDateTime> {
    let mut data = fs::read(path)?;
    normalize_tiff_magic(&mut data).ok_or_else(|| Error::RawMetadata {
        path: path.to_path_buf(),
        message: "Not a TIFF-based RAW file".to_string(),
    })?;

    let exif = Reader::new().read_raw(data).map_err(|e| Error::RawMetadata {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    for tag in RAW_DATE_TAGS {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let rendered = field.display_value().to_string();
            if let Ok(datetime) = NaiveDateTime::parse_from_str(rendered.trim(), RAW_FORMAT) {
                trace!(?path, ?tag, %datetime, "Found RAW date");
                return Ok(datetime);
            }
        }
    }

    Err(Error::RawMetadata {
        path: path.to_path_buf(),
        message: "No datetime taken in RAW header".to_string(),
    })
}

/// Rewrite a vendor TIFF magic to the standard one
///
/// Returns `None` if the data does not start with a known byte order mark.
fn normalize_tiff_magic(data: &mut [u8]) -> Option<()> {
    if data.len() < 8 {
        return None;
    }
    match &data[..2] {
        b"II" => {
            data[2] = 0x2A;
            data[3] = 0x00;
        }
        b"MM" => {
            data[2] = 0x00;
            data[3] = 0x2A;
        }
        _ => return None,
    }
    Some(())
}
