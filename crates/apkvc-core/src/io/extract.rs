//! Archive extraction module
//!
//! APKs are ZIP containers. Small archives are read fully into memory and
//! extracted from there; large ones are streamed entry-by-entry from disk.
//! Either way entries are fanned out over a bounded pool of scoped worker
//! threads, each with its own fixed-size copy buffer.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use bytes::Bytes;
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

/// Archives up to this size are extracted from memory (100 MiB).
pub const DEFAULT_IN_MEMORY_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Per-worker copy buffer (1 MiB).
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid archive: {0}")]
    Archive(#[from] ZipError),

    #[error("Archive entry escapes the destination directory: {0}")]
    UnsafePath(String),

    #[error("Cannot create destination {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Extraction worker panicked")]
    WorkerPanicked,
}

/// How the archive bytes were accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Whole archive buffered in memory.
    InMemory,
    /// Entries streamed from the file on disk.
    Streaming,
}

/// Tuning knobs for [`extract_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Archives at or below this size use [`Strategy::InMemory`].
    pub in_memory_threshold: u64,
    /// Worker count override. Defaults to the logical CPU count.
    pub workers: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            in_memory_threshold: DEFAULT_IN_MEMORY_THRESHOLD,
            workers: None,
        }
    }
}

/// What an extraction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes_written: u64,
    pub strategy: Strategy,
}

#[derive(Debug, Default)]
struct Tally {
    files: usize,
    directories: usize,
    bytes_written: u64,
}

/// Extract an APK with default options.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<ExtractSummary, ExtractError> {
    extract_with(archive_path, dest_dir, &ExtractOptions::default())
}

/// Extract an APK into `dest_dir`.
///
/// Every entry name is checked before any worker starts: an entry that would
/// land outside `dest_dir` rejects the whole archive and nothing is written.
/// The caller owns `dest_dir` and its cleanup.
pub fn extract_with(
    archive_path: &Path,
    dest_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractSummary, ExtractError> {
    let size = fs::metadata(archive_path)?.len();

    fs::create_dir_all(dest_dir).map_err(|source| ExtractError::Destination {
        path: dest_dir.to_path_buf(),
        source,
    })?;
    let dest = dest_dir
        .canonicalize()
        .map_err(|source| ExtractError::Destination {
            path: dest_dir.to_path_buf(),
            source,
        })?;

    let (strategy, tally) = if size <= options.in_memory_threshold {
        let bytes = Bytes::from(fs::read(archive_path)?);
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        validate_entry_names(&archive)?;

        let workers = worker_count(options, archive.len());
        tracing::debug!(
            archive = %archive_path.display(),
            size,
            entries = archive.len(),
            workers,
            "extracting in memory"
        );
        let tally = run_workers(archive.len(), workers, &dest, || Ok(archive.clone()))?;
        (Strategy::InMemory, tally)
    } else {
        let archive = ZipArchive::new(File::open(archive_path)?)?;
        validate_entry_names(&archive)?;

        let entries = archive.len();
        let workers = worker_count(options, entries);
        tracing::debug!(
            archive = %archive_path.display(),
            size,
            entries,
            workers,
            "extracting from disk"
        );
        // Each worker needs its own file handle to seek independently.
        let tally = run_workers(entries, workers, &dest, || {
            Ok(ZipArchive::new(File::open(archive_path)?)?)
        })?;
        (Strategy::Streaming, tally)
    };

    Ok(ExtractSummary {
        files: tally.files,
        directories: tally.directories,
        bytes_written: tally.bytes_written,
        strategy,
    })
}

fn worker_count(options: &ExtractOptions, entries: usize) -> usize {
    options
        .workers
        .unwrap_or_else(num_cpus::get)
        .clamp(1, entries.max(1))
}

fn validate_entry_names<R: Read + Seek>(archive: &ZipArchive<R>) -> Result<(), ExtractError> {
    for name in archive.file_names() {
        if safe_relative_path(name).is_none() {
            return Err(ExtractError::UnsafePath(name.to_string()));
        }
    }
    Ok(())
}

/// Convert an entry name into a path relative to the extraction root.
///
/// Returns `None` for absolute paths, drive prefixes and any `..` component.
pub fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn run_workers<R, F>(
    entries: usize,
    workers: usize,
    dest: &Path,
    open: F,
) -> Result<Tally, ExtractError>
where
    R: Read + Seek,
    F: Fn() -> Result<ZipArchive<R>, ExtractError> + Sync,
{
    let mut total = Tally::default();
    if entries == 0 {
        return Ok(total);
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<ExtractError>> = Mutex::new(None);

    let results: Vec<thread::Result<Option<Tally>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let outcome = drain_entries(&open, &next, &failed, entries, dest);
                    match outcome {
                        Ok(tally) => Some(tally),
                        Err(e) => {
                            failed.store(true, Ordering::Relaxed);
                            if let Ok(mut slot) = first_error.lock() {
                                slot.get_or_insert(e);
                            }
                            None
                        }
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut panicked = false;
    for result in results {
        match result {
            Ok(Some(tally)) => {
                total.files += tally.files;
                total.directories += tally.directories;
                total.bytes_written += tally.bytes_written;
            }
            Ok(None) => {}
            Err(_) => panicked = true,
        }
    }

    let first_error = first_error
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(e) = first_error {
        return Err(e);
    }
    if panicked {
        return Err(ExtractError::WorkerPanicked);
    }
    Ok(total)
}

fn drain_entries<R, F>(
    open: &F,
    next: &AtomicUsize,
    failed: &AtomicBool,
    entries: usize,
    dest: &Path,
) -> Result<Tally, ExtractError>
where
    R: Read + Seek,
    F: Fn() -> Result<ZipArchive<R>, ExtractError>,
{
    let mut archive = open()?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut tally = Tally::default();

    loop {
        if failed.load(Ordering::Relaxed) {
            return Ok(tally);
        }
        let index = next.fetch_add(1, Ordering::Relaxed);
        if index >= entries {
            return Ok(tally);
        }
        match extract_entry(&mut archive, index, dest, &mut buffer)? {
            Some(written) => {
                tally.files += 1;
                tally.bytes_written += written;
            }
            None => tally.directories += 1,
        }
    }
}

/// Extract one entry. Returns the bytes written, or `None` for a directory.
fn extract_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    dest: &Path,
    buffer: &mut [u8],
) -> Result<Option<u64>, ExtractError> {
    let mut entry = archive.by_index(index)?;
    let relative = safe_relative_path(entry.name())
        .ok_or_else(|| ExtractError::UnsafePath(entry.name().to_string()))?;
    let target = dest.join(&relative);
    if !target.starts_with(dest) {
        return Err(ExtractError::UnsafePath(entry.name().to_string()));
    }

    if entry.is_dir() || relative.as_os_str().is_empty() {
        fs::create_dir_all(&target)?;
        return Ok(None);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = File::create(&target)?;
    let mut written = 0u64;
    loop {
        let n = entry.read(buffer)?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
        written += n as u64;
    }

    Ok(Some(written))
}
