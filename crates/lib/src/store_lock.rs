//! File-based store locking.
//!
//! Builds hold the lock in shared mode: concurrent pipeline runs never share a
//! workspace, so they may proceed side by side. `clean` holds it exclusively so
//! it never sweeps the workspace of a run that is still in progress.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::paths::store_dir;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub store: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "store is locked by another process: {command} (PID {pid}, started at unix time {started_at_unix})\n\
     If you're sure no stagehand process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "store is locked by another process\n\
     If you're sure no stagehand process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create store directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held store lock; released when dropped.
pub struct StoreLock {
  file: File,
  mode: LockMode,
  lock_path: PathBuf,
}

impl StoreLock {
  /// Acquire the lock on the current store without blocking.
  pub fn acquire(mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    Self::acquire_in(&store_dir(), mode, command)
  }

  /// Acquire the lock on the store rooted at `store`.
  pub fn acquire_in(store: &Path, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    let lock_path = store.join(LOCK_FILENAME);

    std::fs::create_dir_all(store).map_err(StoreLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    // Only the exclusive holder owns the metadata; shared holders leave it alone
    if mode == LockMode::Exclusive {
      write_metadata(&file, command, store)?;
    }

    debug!(path = %lock_path.display(), ?mode, command, "store lock acquired");

    Ok(StoreLock { file, mode, lock_path })
  }

  /// Reads the lock metadata through the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, store: &Path) -> Result<(), StoreLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    store: store.to_path_buf(),
  };

  file.set_len(0).map_err(StoreLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| StoreLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(StoreLockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> StoreLockError {
  let metadata = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok());

  match metadata {
    Some(metadata) => StoreLockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      started_at_unix: metadata.started_at_unix,
      lock_path: lock_path.to_path_buf(),
    },
    None => StoreLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized,
  // and the handle belongs to an open file owned by the caller.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_creates_store_and_lock_file() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("store");

    let lock = StoreLock::acquire_in(&store, LockMode::Shared, "build").unwrap();

    assert!(lock.lock_path().exists());
    assert_eq!(lock.mode(), LockMode::Shared);
  }

  #[test]
  fn concurrent_builds_share_the_store() {
    let temp = TempDir::new().unwrap();

    let first = StoreLock::acquire_in(temp.path(), LockMode::Shared, "build").unwrap();
    let second = StoreLock::acquire_in(temp.path(), LockMode::Shared, "build").unwrap();

    assert_eq!(first.lock_path(), second.lock_path());
  }

  #[test]
  #[cfg(unix)]
  fn clean_is_refused_while_a_build_runs() {
    let temp = TempDir::new().unwrap();

    let _build = StoreLock::acquire_in(temp.path(), LockMode::Shared, "build").unwrap();
    let result = StoreLock::acquire_in(temp.path(), LockMode::Exclusive, "clean");

    assert!(matches!(
      result,
      Err(StoreLockError::Contention { .. } | StoreLockError::ContentionUnknown { .. })
    ));
  }

  #[test]
  #[cfg(unix)]
  fn build_is_refused_while_clean_runs_and_names_holder() {
    let temp = TempDir::new().unwrap();

    let _clean = StoreLock::acquire_in(temp.path(), LockMode::Exclusive, "clean").unwrap();
    let result = StoreLock::acquire_in(temp.path(), LockMode::Shared, "build");

    match result {
      Err(StoreLockError::Contention { command, pid, .. }) => {
        assert_eq!(command, "clean");
        assert_eq!(pid, std::process::id());
      }
      Err(other) => panic!("expected contention with metadata, got {other}"),
      Ok(_) => panic!("expected contention"),
    }
  }

  #[test]
  fn exclusive_lock_writes_metadata() {
    let temp = TempDir::new().unwrap();

    let lock = StoreLock::acquire_in(temp.path(), LockMode::Exclusive, "clean").unwrap();
    let metadata = lock.read_metadata().unwrap();

    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "clean");
    assert_eq!(metadata.store, temp.path());
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();

    {
      let _lock = StoreLock::acquire_in(temp.path(), LockMode::Exclusive, "clean").unwrap();
    }

    let lock = StoreLock::acquire_in(temp.path(), LockMode::Exclusive, "clean").unwrap();
    assert!(lock.lock_path().exists());
  }
}
