//! Hashing utilities for content-addressed storage and verification.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character hash for store paths and recipe identity
//! - `ContentHash`: A full 64-character hash for artifact and rootfs verification
//! - `hash_directory()`: Deterministic directory hashing (used for base pins and rootfs digests)
//! - `hash_file()`: Single file hashing
//! - `copy_and_hash()`: Copy a file while hashing it in the same pass

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A content-addressed hash identifying a unique object.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized struct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(ObjectHash(full.0[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Truncated form used for store directory names.
  pub fn short(&self) -> &str {
    let len = self.0.len().min(OBJ_HASH_PREFIX_LEN);
    &self.0[..len]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error during file or directory hashing.
#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to write file {path}: {message}")]
  WriteFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Compute a deterministic hash of a directory's contents.
///
/// The hash covers relative paths, file contents, the executable bit of files,
/// and symlink targets. Timestamps and ownership are ignored so that two
/// assemblies of the same inputs produce the same digest.
///
/// `exclude` lists file/directory names skipped at any depth.
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0
      || e
        .file_name()
        .to_str()
        .map(|name| !exclude.contains(&name))
        .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      let content_hash = hash_file(entry_path)?;
      let kind = if is_executable(entry_path) { "X" } else { "F" };
      format!("{}:{}:{}", kind, rel_path, content_hash.0)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| DirHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      let target_hash = hash_bytes(target.to_string_lossy().as_bytes());
      format!("L:{}:{}", rel_path, target_hash.0)
    } else {
      // Sockets, devices and fifos have no place in a build context or image
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let mut file = fs::File::open(path).map_err(|e| DirHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| DirHashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Copy `src` to `dst`, returning the hash and size of the bytes written.
///
/// The destination is created (or truncated) and synced before returning.
pub fn copy_and_hash(src: &Path, dst: &Path) -> Result<(ContentHash, u64), DirHashError> {
  let read_err = |e: std::io::Error| DirHashError::ReadFile {
    path: src.display().to_string(),
    message: e.to_string(),
  };
  let write_err = |e: std::io::Error| DirHashError::WriteFile {
    path: dst.display().to_string(),
    message: e.to_string(),
  };

  let mut input = fs::File::open(src).map_err(read_err)?;
  let mut output = fs::File::create(dst).map_err(write_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  let mut total = 0u64;

  loop {
    let bytes_read = input.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
    output.write_all(&buffer[..bytes_read]).map_err(write_err)?;
    total += bytes_read as u64;
  }

  output.sync_all().map_err(write_err)?;

  Ok((ContentHash(format!("{:x}", hasher.finalize())), total))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Whether a file carries any executable permission bit.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  fs::metadata(path)
    .map(|m| m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
  path.is_file()
}
