//! Build context snapshots.
//!
//! A [`BuildContext`] records every source input of a run (relative paths plus
//! a deterministic digest) at invocation time. The build stage materializes it
//! into its private workspace and checks the copy still hashes to the
//! snapshot, so a source tree mutated mid-run is caught instead of compiled.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::util::hash::{ContentHash, DirHashError, hash_directory};

#[derive(Debug, Error)]
pub enum ContextError {
  #[error("source directory not found: {0}")]
  SourceNotFound(PathBuf),

  #[error("failed to read source tree: {message}")]
  Walk { message: String },

  #[error("unsupported file type in build context: {0}")]
  Unsupported(PathBuf),

  #[error("failed to copy {path}: {message}")]
  Copy { path: PathBuf, message: String },

  #[error("build context changed after snapshot: expected {expected}, got {actual}")]
  Changed { expected: String, actual: String },

  #[error(transparent)]
  Hash(#[from] DirHashError),
}

/// Kind of a snapshotted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
  Dir,
  File,
  Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
  pub path: PathBuf,
  pub kind: EntryKind,
}

/// Immutable snapshot of the source inputs.
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
  pub root: PathBuf,
  pub entries: Vec<ContextEntry>,
  pub hash: ContentHash,
  pub exclude: Vec<String>,
}

impl BuildContext {
  /// Snapshot `source`, skipping `exclude` names at any depth.
  pub fn snapshot(source: &Path, exclude: &[String]) -> Result<Self, ContextError> {
    let root = dunce::canonicalize(source).map_err(|_| ContextError::SourceNotFound(source.to_path_buf()))?;
    if !root.is_dir() {
      return Err(ContextError::SourceNotFound(source.to_path_buf()));
    }

    let excluded = |name: &std::ffi::OsStr| name.to_str().is_some_and(|n| exclude.iter().any(|e| e == n));

    let mut entries = Vec::new();
    let walker = WalkDir::new(&root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| e.depth() == 0 || !excluded(e.file_name()));

    for entry in walker {
      let entry = entry.map_err(|e| ContextError::Walk { message: e.to_string() })?;
      if entry.depth() == 0 {
        continue;
      }

      let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path()).to_path_buf();
      let file_type = entry.file_type();
      let kind = if file_type.is_dir() {
        EntryKind::Dir
      } else if file_type.is_file() {
        EntryKind::File
      } else if file_type.is_symlink() {
        EntryKind::Symlink
      } else {
        return Err(ContextError::Unsupported(rel));
      };

      entries.push(ContextEntry { path: rel, kind });
    }

    let patterns: Vec<&str> = exclude.iter().map(String::as_str).collect();
    let hash = hash_directory(&root, &patterns)?;

    info!(
      root = %root.display(),
      entries = entries.len(),
      hash = %hash.short(),
      "snapshotted build context"
    );

    Ok(Self {
      root,
      entries,
      hash,
      exclude: exclude.to_vec(),
    })
  }

  /// Number of regular files in the snapshot.
  pub fn file_count(&self) -> usize {
    self.entries.iter().filter(|e| e.kind == EntryKind::File).count()
  }

  /// Copy the snapshot into `dest` and confirm the copy matches it.
  pub fn materialize(&self, dest: &Path) -> Result<(), ContextError> {
    fs::create_dir_all(dest).map_err(|e| copy_err(dest, e))?;

    for entry in &self.entries {
      let src = self.root.join(&entry.path);
      let dst = dest.join(&entry.path);

      match entry.kind {
        EntryKind::Dir => fs::create_dir_all(&dst).map_err(|e| copy_err(&src, e))?,
        EntryKind::File => {
          fs::copy(&src, &dst).map_err(|e| copy_err(&src, e))?;
        }
        EntryKind::Symlink => copy_symlink(&src, &dst)?,
      }
    }

    let patterns: Vec<&str> = self.exclude.iter().map(String::as_str).collect();
    let actual = hash_directory(dest, &patterns)?;
    if actual != self.hash {
      return Err(ContextError::Changed {
        expected: self.hash.0.clone(),
        actual: actual.0,
      });
    }

    debug!(dest = %dest.display(), "materialized build context");
    Ok(())
  }
}

fn copy_err(path: &Path, e: std::io::Error) -> ContextError {
  ContextError::Copy {
    path: path.to_path_buf(),
    message: e.to_string(),
  }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), ContextError> {
  let target = fs::read_link(src).map_err(|e| copy_err(src, e))?;
  std::os::unix::fs::symlink(&target, dst).map_err(|e| copy_err(src, e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<(), ContextError> {
  Err(ContextError::Unsupported(src.to_path_buf()))
}
