//! Runtime image assembly.
//!
//! An image is a directory:
//!
//! ```text
//! <out>/
//! ├── image.json   # ImageManifest
//! └── rootfs/      # pinned base (or empty) + the artifact at its install path
//! ```
//!
//! The assembler receives a promoted artifact and the runtime section of the
//! recipe, nothing else. It has no access to the build workspace or the
//! build-time configuration value.

mod assemble;
mod types;

pub use assemble::{assemble_image, load_image, verify_image};
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::util::hash::DirHashError;

#[derive(Debug, Error)]
pub enum ImageError {
  /// The artifact handed over by the build stage is not the one promised.
  #[error("artifact handoff failed: {0}")]
  Handoff(#[from] ArtifactError),

  #[error("artifact contract mismatch for {field}: expected '{expected}', got '{actual}'")]
  ContractMismatch {
    field: &'static str,
    expected: String,
    actual: String,
  },

  #[error("output directory {0} already exists (use --force to replace it)")]
  OutputExists(PathBuf),

  #[error("base root filesystem not found: {0}")]
  BaseMissing(PathBuf),

  #[error("base root filesystem {path} digest mismatch: expected {expected}, got {actual}")]
  BaseDigestMismatch {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  #[error("invalid image manifest {path}: {message}")]
  Manifest { path: PathBuf, message: String },

  #[error("image entrypoint {actual:?} does not match artifact path {expected}")]
  EntrypointMismatch { expected: String, actual: Vec<String> },

  #[error("image root filesystem digest mismatch: expected {expected}, got {actual}")]
  RootfsDigestMismatch { expected: String, actual: String },

  #[error("unexpected entry in image: {0}")]
  UnexpectedEntry(PathBuf),

  /// A path inside the image leaves the root filesystem or passes through a symlink.
  #[error("unsafe image path {}: {reason}", path.display())]
  UnsafePath { path: PathBuf, reason: &'static str },

  #[error("artifact in image is not executable: {0}")]
  NotExecutable(PathBuf),

  #[error("failed to copy {path}: {message}")]
  Copy { path: PathBuf, message: String },

  #[error(transparent)]
  Hash(#[from] DirHashError),

  #[error("failed to serialize image manifest: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
