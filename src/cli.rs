//! CLI argument parsing with clap

use crate::config::{Config, FolderStructure};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Photo Sorter - organize photos, videos and RAW files by date
///
/// Files are moved in place under the base directory into date folders
/// derived from EXIF or RAW metadata, falling back to the file's
/// modification time. Duplicates are detected by content and left alone.
#[derive(Parser, Debug)]
#[command(name = "photo-sorter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// CLI arguments override settings from the file.
    #[arg(short = 'C', long, env = "PHOTO_SORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory to organize
    #[arg(short, long, env = "PHOTO_SORTER_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Folder layout for dated files
    #[arg(short = 's', long, value_enum)]
    pub folder_structure: Option<FolderStructure>,

    /// Number of move workers (0 = auto)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Put all videos in a top-level Videos folder
    #[arg(long)]
    pub separate_videos: bool,

    /// Folders to leave untouched (repeatable; relative to the base dir)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<PathBuf>,

    /// Delete the metadata cache before running
    #[arg(long)]
    pub reset_cache: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log file as JSON
    #[arg(long)]
    pub json_log: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do with the base directory
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sort media files into date folders (default)
    Organize,
    /// Move every file under the base dir into one folder
    Flatten {
        /// Destination folder; may be the base dir itself
        #[arg(short, long)]
        target: PathBuf,
    },
    /// Rename "xxx IMG_1234 yyy.jpg" style names to "IMG_1234.jpg"
    CleanNames {
        /// Only the top level of the base dir
        #[arg(long)]
        no_recursive: bool,
    },
}

impl Cli {
    /// Subcommand to run; `organize` when none is given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Organize)
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref base_dir) = self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(structure) = self.folder_structure {
            config.folder_structure = structure;
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if self.separate_videos {
            config.separate_videos = true;
        }
        if !self.exclude.is_empty() {
            config.excluded_folders = self.exclude.clone();
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        let mut config = Config::default();

        if let Some(ref base_dir) = self.base_dir {
            config.base_dir = base_dir.clone();
        }
        config.folder_structure = self.folder_structure.unwrap_or_default();
        config.max_workers = self.workers.unwrap_or(0);
        config.separate_videos = self.separate_videos;
        config.excluded_folders = self.exclude.clone();

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_organize() {
        let cli = Cli::parse_from(["photo-sorter", "--base-dir", "/photos"]);
        assert_eq!(cli.command(), Command::Organize);

        let config = cli.to_config();
        assert_eq!(config.base_dir, PathBuf::from("/photos"));
        assert_eq!(config.folder_structure, FolderStructure::Day);
        assert_eq!(config.max_workers, 0);
        assert!(!config.separate_videos);
    }

    #[test]
    fn test_flags_override_file_config() {
        let cli = Cli::parse_from([
            "photo-sorter",
            "-s",
            "year-month",
            "--separate-videos",
            "-x",
            "keep",
            "-x",
            "also",
        ]);
        let mut file_config = Config::new("/from/file");
        file_config.max_workers = 3;

        let config = cli.merge_with_config(file_config);
        assert_eq!(config.base_dir, PathBuf::from("/from/file"));
        assert_eq!(config.folder_structure, FolderStructure::YearMonth);
        assert_eq!(config.max_workers, 3);
        assert!(config.separate_videos);
        assert_eq!(config.excluded_folders, vec![PathBuf::from("keep"), PathBuf::from("also")]);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from(["photo-sorter", "flatten", "--target", "/flat"]);
        assert_eq!(
            cli.command(),
            Command::Flatten {
                target: PathBuf::from("/flat")
            }
        );

        let cli = Cli::parse_from(["photo-sorter", "clean-names", "--no-recursive"]);
        assert_eq!(cli.command(), Command::CleanNames { no_recursive: true });
    }
}
