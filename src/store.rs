//! File-locked atomic JSON storage.
//!
//! Every read-then-write sequence against shared state files goes through
//! this module: an exclusive advisory lock with a bounded timeout, a write
//! to a temporary sibling, and an atomic rename. Lock acquisition never
//! blocks indefinitely; callers that hit the timeout fall back to safe
//! defaults instead of crashing.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, VigilError};

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 3000;

/// Polling interval while waiting for a contended lock.
const LOCK_RETRY_INTERVAL_MS: u64 = 25;

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix.
const LOCK_SUFFIX: &str = ".lock";

/// An acquired exclusive lock. Released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock on {}: {}", self.path.display(), e);
        }
    }
}

/// Returns the lock file path for a state file.
#[must_use]
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(LOCK_SUFFIX);
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(TMP_SUFFIX);
    path.with_file_name(name)
}

/// Acquires an exclusive lock guarding `path`, retrying until `timeout_ms`.
///
/// # Errors
///
/// Returns [`VigilError::LockTimeout`] if the lock cannot be acquired
/// within the timeout, or an I/O error if the lock file cannot be created.
pub fn lock_exclusive(path: &Path, timeout_ms: u64) -> Result<FileLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lock_file_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_file_path)?;

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                return Ok(FileLock {
                    file,
                    path: lock_file_path,
                })
            }
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(LOCK_RETRY_INTERVAL_MS));
            }
            Err(_) => {
                return Err(VigilError::LockTimeout {
                    path: lock_file_path,
                    timeout_ms,
                })
            }
        }
    }
}

/// Reads and deserializes a JSON state file.
///
/// Returns `Ok(None)` if the file does not exist. A file that exists but
/// cannot be parsed yields [`VigilError::CorruptState`]; callers in the
/// hook path treat that the same as missing state.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Corrupt state file {}: {}", path.display(), e);
            Err(VigilError::CorruptState {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Serializes `value` and writes it atomically (tmp file + rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let json = serde_json::to_string_pretty(value)?;

    let mut tmp_file = File::create(&tmp)?;
    tmp_file.write_all(json.as_bytes())?;
    tmp_file.sync_all()?;

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Appends one line to a JSONL file under an exclusive lock.
///
/// Used for the append-only inheritance audit log; records are never
/// rewritten once appended.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let _lock = lock_exclusive(path, DEFAULT_LOCK_TIMEOUT_MS)?;
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}
