//! Leak detection without retaining the secret.
//!
//! A fingerprint stores, per needle, its length, a polynomial rolling hash and
//! its SHA-256 digest. Scanning slides a window over the input and only
//! computes a digest when the rolling hash matches, so images of any size are
//! checked in a single pass while the configuration value itself is already
//! dropped.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

const BASE: u64 = 257;

/// Secret components shorter than this are not scanned for on their own; they
/// would match unrelated bytes in any sizable binary.
pub const MIN_COMPONENT_LEN: usize = 8;

#[derive(Clone, PartialEq, Eq)]
struct Needle {
  len: usize,
  rolling: u64,
  digest: [u8; 32],
}

impl Needle {
  fn new(bytes: &[u8]) -> Self {
    Self {
      len: bytes.len(),
      rolling: rolling_hash(bytes),
      digest: Sha256::digest(bytes).into(),
    }
  }

  fn found_in(&self, data: &[u8]) -> bool {
    let n = self.len;
    if n == 0 || data.len() < n {
      return false;
    }

    let high = (1..n).fold(1u64, |acc, _| acc.wrapping_mul(BASE));
    let mut hash = rolling_hash(&data[..n]);

    for start in 0..=data.len() - n {
      if hash == self.rolling && Sha256::digest(&data[start..start + n]).as_slice() == self.digest {
        return true;
      }
      if start + n < data.len() {
        hash = hash
          .wrapping_sub(symbol(data[start]).wrapping_mul(high))
          .wrapping_mul(BASE)
          .wrapping_add(symbol(data[start + n]));
      }
    }

    false
  }
}

fn symbol(byte: u8) -> u64 {
  byte as u64 + 1
}

fn rolling_hash(bytes: &[u8]) -> u64 {
  bytes
    .iter()
    .fold(0u64, |hash, &b| hash.wrapping_mul(BASE).wrapping_add(symbol(b)))
}

/// Detects occurrences of a secret (and its sensitive components) in bytes,
/// files and directory trees.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretFingerprint {
  needles: Vec<Needle>,
}

impl SecretFingerprint {
  /// A fingerprint that never matches; used when no secret is in play.
  pub fn empty() -> Self {
    Self::default()
  }

  /// Build a fingerprint for `secret` and any additional sensitive components.
  pub(crate) fn new(secret: &str, components: &[&str]) -> Self {
    let mut needles = Vec::new();
    if !secret.is_empty() {
      needles.push(Needle::new(secret.as_bytes()));
    }
    for component in components {
      if component.len() >= MIN_COMPONENT_LEN && *component != secret {
        needles.push(Needle::new(component.as_bytes()));
      }
    }
    Self { needles }
  }

  pub fn is_empty(&self) -> bool {
    self.needles.is_empty()
  }

  pub fn matches(&self, data: &[u8]) -> bool {
    self.needles.iter().any(|needle| needle.found_in(data))
  }

  pub fn scan_file(&self, path: &Path) -> io::Result<bool> {
    if self.is_empty() {
      return Ok(false);
    }
    let data = std::fs::read(path)?;
    Ok(self.matches(&data))
  }

  /// Scan every file, file name and symlink target under `root`.
  ///
  /// Returns the first path where the secret was found.
  pub fn scan_dir(&self, root: &Path) -> io::Result<Option<PathBuf>> {
    if self.is_empty() {
      return Ok(None);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
      let entry = entry.map_err(io::Error::other)?;
      let path = entry.path();

      if self.matches(entry.file_name().as_encoded_bytes()) {
        return Ok(Some(path.to_path_buf()));
      }

      let file_type = entry.file_type();
      if file_type.is_symlink() {
        let target = std::fs::read_link(path)?;
        if self.matches(target.as_os_str().as_encoded_bytes()) {
          return Ok(Some(path.to_path_buf()));
        }
      } else if file_type.is_file() && self.scan_file(path)? {
        return Ok(Some(path.to_path_buf()));
      }
    }

    Ok(None)
  }
}

impl fmt::Debug for SecretFingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SecretFingerprint")
      .field("needles", &self.needles.len())
      .finish()
  }
}
