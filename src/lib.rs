//! Photo Sorter - organizes a photo/video/raw library into date folders, in place
//!
//! This library provides:
//! - EXIF and RAW (TIFF container) date extraction, with mtime fallback
//! - A persistent metadata cache keyed by content fingerprint
//! - xxHash-based duplicate detection, confirmed byte for byte
//! - Parallel moves with Rayon, conflict renaming and cooperative cancellation
//! - Progress and log events over a channel

pub mod cache;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod events;
pub mod hash;
pub mod layout;
pub mod process;
pub mod scan;
pub mod tidy;
pub mod time;

pub use cache::MetadataStore;
pub use cli::{Cli, Command};
pub use config::{Config, FolderStructure, MediaKind};
pub use error::{Error, Result};
pub use events::{CancelToken, EventChannel, EventReceiver, EventSender, OrganizerEvent, RunSummary};
pub use process::{FileResult, MoveOutcome, Organizer, RunReport};
pub use tidy::{clean_img_filenames, flatten_folder_tree};
