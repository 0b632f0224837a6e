//! Photo Sorter - organize a photo/video/raw library by date, in place

use anyhow::Result;
use clap::Parser;
use photo_sorter::scan::LOG_FILENAME;
use photo_sorter::{
    Cli, Command, Config, EventChannel, MetadataStore, Organizer, OrganizerEvent, RunSummary,
    clean_img_filenames, flatten_folder_tree,
};
use std::path::Path;
use std::thread;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli_output {
    //! Colored terminal output

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(format!("{}\n", "─".repeat(60))));
    }

    pub fn print_title(title: &str) {
        let padding = 60usize.saturating_sub(title.len()) / 2;
        let _ = stdout().execute(Print(" ".repeat(padding)));
        let _ = stdout().execute(Print(style(title).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// One event line, prefixed with the current percentage
    pub fn print_progress_line(percent: u8, msg: &str) {
        let _ = stdout().execute(Print(
            style(format!("[{:>3}%] ", percent)).with(CliTheme::ACCENT),
        ));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_stat(key: &str, value: usize, color: Color) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(key).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(style(value.to_string()).with(color).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_rename(from: &str, to: &str) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(from).italic()));
        let _ = stdout().execute(Print(style(" → ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", to)));
    }

    pub fn print_log_path(path: &str) {
        let _ = stdout().execute(Print(style("Log file: ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    config.validate()?;
    let root = config.absolute_base_dir()?;
    let log_path = root.join(LOG_FILENAME);

    let _guard = setup_logging(&cli, &log_path)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Photo Sorter starting");
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }

    let outcome = match cli.command() {
        Command::Organize => run_organize(&cli, config),
        Command::Flatten { target } => run_flatten(&root, &target),
        Command::CleanNames { no_recursive } => run_clean_names(&root, !no_recursive),
    };

    if let Err(e) = outcome {
        error!(error = %e, "Run failed");
        cli_output::print_warning(&format!("Error: {}", e));
        std::process::exit(1);
    }

    cli_output::print_log_path(&log_path.display().to_string());
    Ok(())
}

fn run_organize(cli: &Cli, config: Config) -> Result<()> {
    use cli_output::*;

    if cli.reset_cache && MetadataStore::reset(&config.absolute_base_dir()?)? {
        info!("Metadata cache deleted");
    }

    let (sender, receiver) = EventChannel::bounded(1024);
    let organizer = Organizer::new(config)?.with_events(sender);

    // The organizer owns the only sender; the loop ends when the worker drops it
    let worker = thread::spawn(move || organizer.organize());

    let mut percent = 0u8;
    let mut summary: Option<(RunSummary, bool)> = None;
    for event in receiver.iter() {
        match event {
            OrganizerEvent::Progress(p) => percent = p,
            OrganizerEvent::Log(msg) => print_progress_line(percent, &msg),
            OrganizerEvent::TotalFiles(n) => info!(total = n, "Media files found"),
            OrganizerEvent::Completed(s) => summary = Some((s, false)),
            OrganizerEvent::Cancelled(s) => summary = Some((s, true)),
        }
    }

    let report = match worker.join() {
        Ok(report) => report?,
        Err(_) => anyhow::bail!("Organizer thread panicked"),
    };
    let (summary, cancelled) = summary.unwrap_or((report.summary, report.cancelled));

    print_separator();
    print_title(if cancelled {
        "Organization cancelled"
    } else {
        "Organization complete"
    });
    print_separator();
    print_stat("Total", summary.total, CliTheme::ACCENT);
    print_stat("Moved", summary.moved, CliTheme::SUCCESS);
    print_stat("Duplicates", summary.duplicates, CliTheme::WARNING);
    print_stat("Already there", summary.already_there, CliTheme::HINT);
    print_stat("Errors", summary.errors, CliTheme::ERROR);
    print_separator();

    Ok(())
}

fn run_flatten(root: &Path, target: &Path) -> Result<()> {
    use cli_output::*;

    let moves = flatten_folder_tree(root, target)?;
    print_separator();
    print_title("Flatten complete");
    print_separator();
    print_stat("Files moved", moves.len(), CliTheme::SUCCESS);
    print_separator();
    Ok(())
}

fn run_clean_names(root: &Path, recursive: bool) -> Result<()> {
    use cli_output::*;

    let renames = clean_img_filenames(root, recursive)?;
    for (from, to) in &renames {
        print_rename(&from.display().to_string(), &to.display().to_string());
    }
    print_separator();
    print_stat("Files renamed", renames.len(), CliTheme::SUCCESS);
    print_separator();
    Ok(())
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let file_config = Config::load_from_file(config_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    if config.base_dir.as_os_str().is_empty() {
        anyhow::bail!("No base directory given; use --base-dir or a config file");
    }

    Ok(config)
}

/// Log to stderr and to the log file in the organized root
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<WorkerGuard> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(guard)
}
