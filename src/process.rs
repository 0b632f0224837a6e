//! Organizer: scan, date extraction and concurrent moves
//!
//! A run has two phases:
//! - gather: scan the root, answer what the metadata cache can, extract the
//!   rest on a small Rayon pool, then persist the cache from this thread only
//! - move: compute every target path, then move files in batches on a second
//!   pool; conflict resolution and destination claims happen under one lock,
//!   the physical move outside it
//!
//! One file's failure never stops the batch. Cancellation is checked before
//! each batch and each file; work already started is allowed to finish.

use crate::cache::{MetadataStore, ModTime};
use crate::config::{Config, MediaKind};
use crate::conflict::{Resolution, resolve_with_claims};
use crate::error::Result;
use crate::events::{CancelToken, EventSender, OrganizerEvent, RunSummary};
use crate::hash::{quick_fingerprint, same_content};
use crate::layout::target_dir;
use crate::scan::{ScannedFile, scan};
use crate::time::date_taken;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{Level, debug, error, info, span, warn};

/// A media file with everything needed to place it
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub mod_time: Option<ModTime>,
    /// Quick content fingerprint; empty if the file could not be read
    pub fingerprint: String,
    pub date_taken: Option<NaiveDateTime>,
}

/// Terminal state of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Moved to this path
    Moved(PathBuf),
    /// Identical content already lives at this path; source left in place
    SkippedDuplicate(PathBuf),
    /// Source already sits at its destination
    SkippedAlreadyThere,
    /// Per-file failure, with the error message
    Errored(String),
}

/// Result of processing a single file
#[derive(Debug, Clone)]
pub struct FileResult {
    pub source: PathBuf,
    pub fingerprint: String,
    pub date_taken: Option<NaiveDateTime>,
    pub outcome: MoveOutcome,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: Vec<FileResult>,
    pub cancelled: bool,
}

/// Per-run counters, updated by the move workers
#[derive(Debug, Default)]
pub struct RunStats {
    pub total_files: AtomicUsize,
    pub moved: AtomicUsize,
    pub duplicates: AtomicUsize,
    pub already_there: AtomicUsize,
    pub errors: AtomicUsize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&self) {
        self.total_files.store(0, Ordering::Relaxed);
        self.moved.store(0, Ordering::Relaxed);
        self.duplicates.store(0, Ordering::Relaxed);
        self.already_there.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    fn record(&self, outcome: &MoveOutcome) {
        let counter = match outcome {
            MoveOutcome::Moved(_) => &self.moved,
            MoveOutcome::SkippedDuplicate(_) => &self.duplicates,
            MoveOutcome::SkippedAlreadyThere => &self.already_there,
            MoveOutcome::Errored(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            total: self.total_files.load(Ordering::Relaxed),
            moved: self.moved.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            already_there: self.already_there.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Total: {}, Moved: {}, Duplicates: {}, Already there: {}, Errors: {}",
            s.total, s.moved, s.duplicates, s.already_there, s.errors
        )
    }
}

/// Where a piece of content kept in this run lives
#[derive(Debug, Clone)]
struct ContentLocation {
    source: PathBuf,
    destination: PathBuf,
}

impl ContentLocation {
    /// Paths that may hold the content, source first
    ///
    /// A rename moves the content from source to destination atomically, so
    /// checking in this order never misses it while a move is in flight.
    fn candidates(&self) -> impl Iterator<Item = &Path> {
        let destination = (self.destination != self.source).then_some(self.destination.as_path());
        std::iter::once(self.source.as_path()).chain(destination)
    }
}

/// Per-run shared state, guarded by a single lock
#[derive(Debug, Default)]
struct RunState {
    /// Destination paths claimed in this run
    claimed: HashSet<PathBuf>,
    /// fingerprint -> content kept in this run
    seen: HashMap<String, Vec<ContentLocation>>,
}

impl RunState {
    fn register(&mut self, fingerprint: &str, source: &Path, destination: &Path) {
        if fingerprint.is_empty() {
            return;
        }
        self.seen
            .entry(fingerprint.to_string())
            .or_default()
            .push(ContentLocation {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
            });
    }

    /// Find kept content identical to `record`, confirmed byte for byte
    fn find_duplicate(&self, record: &FileRecord) -> Option<PathBuf> {
        let locations = self.seen.get(&record.fingerprint)?;
        locations
            .iter()
            .filter(|loc| loc.source != record.path)
            .flat_map(ContentLocation::candidates)
            .find(|candidate| same_content(candidate, &record.path, &record.fingerprint))
            .map(Path::to_path_buf)
    }
}

/// A file with its computed destination
#[derive(Debug, Clone)]
struct PlannedMove {
    record: FileRecord,
    destination: PathBuf,
}

/// Main organizer for one root directory
pub struct Organizer {
    config: Config,
    root: PathBuf,
    excluded: Vec<PathBuf>,
    events: EventSender,
    cancel: CancelToken,
    stats: RunStats,
}

impl Organizer {
    /// Create an organizer; rejects an invalid base directory before any work
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let root = config.absolute_base_dir()?;
        let excluded = config.absolute_excluded_folders()?;

        Ok(Self {
            config,
            root,
            excluded,
            events: EventSender::disabled(),
            cancel: CancelToken::new(),
            stats: RunStats::new(),
        })
    }

    /// Deliver progress and log events to this sender
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Use a caller-owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this organizer's run
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Organize every media file under the root
    ///
    /// The cancellation token is never reset; a new run needs a new organizer
    /// (or a fresh token).
    pub fn organize(&self) -> Result<RunReport> {
        let _span = span!(Level::INFO, "organize", root = ?self.root).entered();
        self.stats.reset();

        let cache_path = MetadataStore::path_for(&self.root);
        let mut store = MetadataStore::load(&cache_path);

        let records = self.gather(&mut store)?;
        let total = records.len();
        self.stats.total_files.store(total, Ordering::Relaxed);
        self.events.send(OrganizerEvent::TotalFiles(total));
        self.events.progress(0);

        let results = if self.is_cancelled() {
            Vec::new()
        } else {
            self.events.log(format!("Found {} files to organize.", total));
            self.move_all(records)?
        };

        remember_moves(&mut store, &results);
        save_cache(&mut store, &cache_path);

        let summary = self.stats.snapshot();
        info!("{}", self.stats.summary());

        let cancelled = self.is_cancelled();
        if cancelled {
            self.events.progress(0);
            self.events.log("Operation cancelled.");
            self.events.send(OrganizerEvent::Cancelled(summary));
        } else {
            self.events.progress(100);
            self.events.log("Organization complete.");
            self.events.send(OrganizerEvent::Completed(summary));
        }

        Ok(RunReport {
            summary,
            results,
            cancelled,
        })
    }

    /// Organize a single file under the root
    ///
    /// Returns `None` if the file does not exist, is not a media file, or the
    /// run was cancelled.
    pub fn organize_file(&self, path: &Path) -> Result<Option<FileResult>> {
        let path = std::path::absolute(path)?;
        let _span = span!(Level::INFO, "organize_file", ?path).entered();
        self.events.progress(0);

        if !path.exists() {
            self.events.log(format!("{} does not exist.", path.display()));
            self.events.progress(100);
            return Ok(None);
        }
        let Some(kind) = MediaKind::from_path(&path) else {
            self.events
                .log(format!("{} is not a supported media file.", path.display()));
            self.events.progress(100);
            return Ok(None);
        };
        if self.is_cancelled() {
            return Ok(None);
        }

        let cache_path = MetadataStore::path_for(&self.root);
        let mut store = MetadataStore::load(&cache_path);

        let mod_time = ModTime::of(&path).ok();
        let record = match mod_time.and_then(|mt| store.lookup_with_mod_time(&path, mt)) {
            Some(hit) => FileRecord {
                path: path.clone(),
                kind,
                mod_time,
                fingerprint: hit.fingerprint,
                date_taken: hit.metadata.date_taken,
            },
            None => {
                let record = extract_record(ScannedFile { path, kind }, mod_time);
                cache_record(&mut store, &record);
                record
            }
        };

        let planned = self.plan(record);
        let state = Mutex::new(RunState::default());
        let result = self.move_one(&planned, &state);
        self.stats.record(&result.outcome);

        remember_moves(&mut store, std::slice::from_ref(&result));
        save_cache(&mut store, &cache_path);

        self.events.progress(100);
        self.events
            .log(format!("Finished organizing {}", result.source.display()));
        Ok(Some(result))
    }

    /// Scan and resolve the date of every media file
    fn gather(&self, store: &mut MetadataStore) -> Result<Vec<FileRecord>> {
        info!("Scanning for media files...");
        self.events.log(format!("Scanning {}...", self.root.display()));

        let mut records = Vec::new();
        let mut pending = Vec::new();
        let mut current_paths = HashSet::new();

        for file in scan(&self.root, &self.excluded) {
            if self.is_cancelled() {
                break;
            }
            current_paths.insert(file.path.clone());

            let mod_time = ModTime::of(&file.path).ok();
            match mod_time.and_then(|mt| store.lookup_with_mod_time(&file.path, mt)) {
                Some(hit) => records.push(FileRecord {
                    path: file.path,
                    kind: file.kind,
                    mod_time,
                    fingerprint: hit.fingerprint,
                    date_taken: hit.metadata.date_taken,
                }),
                None => pending.push((file, mod_time)),
            }
        }

        info!(
            cached = records.len(),
            to_extract = pending.len(),
            "Scan complete"
        );

        if !pending.is_empty() && !self.is_cancelled() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.extract_workers())
                .thread_name(|i| format!("extract-{}", i))
                .build()?;

            let cancel = &self.cancel;
            let extracted: Vec<FileRecord> = pool.install(|| {
                pending
                    .into_par_iter()
                    .filter_map(|(file, mod_time)| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        Some(extract_record(file, mod_time))
                    })
                    .collect()
            });

            // Workers only return results; the store is written here
            for record in &extracted {
                cache_record(store, record);
            }
            records.extend(extracted);
        }

        if !self.is_cancelled() {
            store.prune_orphans(&current_paths);
        }

        self.events
            .log(format!("Loaded metadata for {} files.", records.len()));
        Ok(records)
    }

    fn plan(&self, record: FileRecord) -> PlannedMove {
        let dir = target_dir(
            &self.root,
            record.kind,
            record.date_taken.as_ref(),
            self.config.folder_structure,
            self.config.separate_videos,
        );
        let destination = match record.path.file_name() {
            Some(name) => dir.join(name),
            None => dir,
        };
        PlannedMove {
            record,
            destination,
        }
    }

    /// Move phase over a worker pool
    fn move_all(&self, records: Vec<FileRecord>) -> Result<Vec<FileResult>> {
        let total = records.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let planned: Vec<PlannedMove> = records.into_iter().map(|r| self.plan(r)).collect();

        // Content already in place anchors duplicate detection for everything else
        let mut initial = RunState::default();
        for p in planned.iter().filter(|p| p.record.path == p.destination) {
            initial.claimed.insert(p.destination.clone());
            initial.register(&p.record.fingerprint, &p.record.path, &p.destination);
        }
        let state = Mutex::new(initial);

        let workers = self.config.move_workers();
        let batch_size = (total / (workers * 4)).max(10);
        debug!(workers, batch_size, "Starting move phase");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("move-{}", i))
            .build()?;

        let completed = AtomicUsize::new(0);
        let progress = ProgressTracker::new(total, &self.events);

        let results = pool.install(|| {
            planned
                .par_chunks(batch_size)
                .flat_map_iter(|batch| {
                    let mut out = Vec::with_capacity(batch.len());
                    if self.is_cancelled() {
                        return out;
                    }
                    for planned in batch {
                        if self.is_cancelled() {
                            break;
                        }
                        let result = self.move_one(planned, &state);
                        self.stats.record(&result.outcome);
                        out.push(result);
                    }
                    let done = completed.fetch_add(out.len(), Ordering::SeqCst) + out.len();
                    progress.report(done);
                    out
                })
                .collect()
        });

        Ok(results)
    }

    /// Pending -> Resolving (lock held) -> Moving -> terminal
    fn move_one(&self, planned: &PlannedMove, state: &Mutex<RunState>) -> FileResult {
        let record = &planned.record;
        let source = &record.path;
        let _span = span!(Level::DEBUG, "move_file", ?source).entered();

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let target_folder = planned
            .destination
            .parent()
            .unwrap_or(self.root.as_path())
            .to_path_buf();

        let finish = |outcome: MoveOutcome| FileResult {
            source: source.clone(),
            fingerprint: record.fingerprint.clone(),
            date_taken: record.date_taken,
            outcome,
        };

        if *source == planned.destination {
            debug!("File already at destination");
            self.events.log(format!("Skipped {}, already there", name));
            return finish(MoveOutcome::SkippedAlreadyThere);
        }

        let resolution = {
            let mut guard = lock(state);
            match guard.find_duplicate(record) {
                Some(existing) => Ok(Resolution::Duplicate(existing)),
                None => {
                    let run = &*guard;
                    let resolved = resolve_with_claims(
                        &planned.destination,
                        source,
                        &record.fingerprint,
                        |candidate| run.claimed.contains(candidate),
                    );
                    if let Ok(resolution) = &resolved
                        && let Some(dest) = resolution.destination()
                    {
                        guard.claimed.insert(dest.to_path_buf());
                        guard.register(&record.fingerprint, source, dest);
                    }
                    resolved
                }
            }
        };

        let dest = match resolution {
            Ok(Resolution::UseAsIs(dest)) | Ok(Resolution::UseRenamed(dest)) => dest,
            Ok(Resolution::Duplicate(existing)) => {
                info!(duplicate_of = ?existing, "Skipping duplicate");
                self.events.log(format!(
                    "Skipped {}, duplicate of {}",
                    name,
                    existing.display()
                ));
                return finish(MoveOutcome::SkippedDuplicate(existing));
            }
            Err(e) => {
                error!(error = %e, "Failed to resolve destination");
                self.events.log(format!("Error moving {}: {}", name, e));
                return finish(MoveOutcome::Errored(e.to_string()));
            }
        };

        match move_file(source, &dest) {
            Ok(()) => {
                info!(destination = ?dest, "Moved file");
                if dest.file_name() == source.file_name() {
                    self.events
                        .log(format!("Moved {} → {}", name, target_folder.display()));
                } else {
                    self.events.log(format!(
                        "Moved {} → {}",
                        name,
                        dest.display()
                    ));
                }
                finish(MoveOutcome::Moved(dest))
            }
            Err(e) => {
                error!(destination = ?dest, error = %e, "Failed to move file");
                lock(state).claimed.remove(&dest);
                self.events.log(format!("Error moving {}: {}", name, e));
                finish(MoveOutcome::Errored(e.to_string()))
            }
        }
    }
}

/// Emits monotonic percentages after each completed batch
struct ProgressTracker<'a> {
    total: usize,
    last: Mutex<u8>,
    events: &'a EventSender,
}

impl<'a> ProgressTracker<'a> {
    fn new(total: usize, events: &'a EventSender) -> Self {
        Self {
            total,
            last: Mutex::new(0),
            events,
        }
    }

    fn report(&self, completed: usize) {
        let percent = ((completed.min(self.total) * 100) / self.total.max(1)) as u8;
        let mut last = lock(&self.last);
        // Emitting under the lock keeps the sequence ordered
        if percent > *last {
            *last = percent;
            self.events.progress(percent);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fingerprint and date of a cache miss (runs on extraction workers)
fn extract_record(file: ScannedFile, mod_time: Option<ModTime>) -> FileRecord {
    let fingerprint = quick_fingerprint(&file.path);
    let date_taken = date_taken(&file.path, file.kind).map(|t| t.timestamp);
    FileRecord {
        path: file.path,
        kind: file.kind,
        mod_time,
        fingerprint,
        date_taken,
    }
}

fn cache_record(store: &mut MetadataStore, record: &FileRecord) {
    let Some(mod_time) = record.mod_time else {
        return;
    };
    if let Err(e) = store.store(
        &record.fingerprint,
        record.date_taken,
        &record.path,
        mod_time,
    ) {
        warn!(path = ?record.path, error = %e, "Failed to cache metadata");
    }
}

/// Re-key cache entries of moved files to their new paths
fn remember_moves(store: &mut MetadataStore, results: &[FileResult]) {
    for result in results {
        if let MoveOutcome::Moved(dest) = &result.outcome {
            store.forget_path(&result.source);
            if let Ok(mod_time) = ModTime::of(dest)
                && let Err(e) = store.store(&result.fingerprint, result.date_taken, dest, mod_time)
            {
                warn!(path = ?dest, error = %e, "Failed to cache metadata");
            }
        }
    }
}

fn save_cache(store: &mut MetadataStore, cache_path: &Path) {
    if !store.is_dirty() {
        return;
    }
    if let Err(e) = store.save(cache_path) {
        warn!(path = ?cache_path, error = %e, "Failed to save metadata cache");
    }
}

/// Move a file: rename, or copy + delete across devices
///
/// The destination keeps the source's modification time.
pub(crate) fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Err(e) = fs::rename(source, dest) {
        debug!(?source, ?dest, error = %e, "Rename failed, copying instead");
        copy_and_remove(source, dest)?;
    }

    Ok(())
}

/// Copy fallback of [`move_file`]; never touches a destination it did not create
fn copy_and_remove(source: &Path, dest: &Path) -> Result<()> {
    let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(source)?);
    copy_file(source, dest)?;
    if let Err(e) = filetime::set_file_mtime(dest, mtime) {
        warn!(?dest, error = %e, "Failed to preserve modification time");
    }
    fs::remove_file(source)?;
    Ok(())
}

/// Copy file with buffered I/O; fails if the destination exists
///
/// A partially written destination is removed on failure.
fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    let src_file = File::open(source)?;
    let dest_file = File::options().write(true).create_new(true).open(dest)?;

    // From here on the destination is ours to clean up
    let copied = copy_contents(src_file, dest_file);
    if copied.is_err() {
        let _ = fs::remove_file(dest);
    }
    copied
}

fn copy_contents(src_file: File, dest_file: File) -> Result<()> {
    let mut reader = BufReader::with_capacity(256 * 1024, src_file);
    let mut writer = BufWriter::with_capacity(256 * 1024, dest_file);

    let mut buffer = vec![0u8; 256 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()?;
    Ok(())
}
