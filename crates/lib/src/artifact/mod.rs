//! The artifact contract between the build and runtime stages.
//!
//! A promoted artifact lives in the store under a content-addressed directory:
//!
//! ```text
//! artifacts/<manifest hash>/
//! ├── <artifact name>        # the executable, mode 0755
//! ├── artifact.json          # ArtifactManifest
//! └── .stagehand-complete    # ArtifactMarker, written last
//! ```
//!
//! Promotion stages the directory next to its final location and renames it
//! into place, so a directory without a valid marker is never trusted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{ARTIFACT_COMPLETE_MARKER, ARTIFACT_MANIFEST_FILE};
use crate::platform::Platform;
use crate::platform::paths::artifacts_dir;
use crate::util::hash::{ContentHash, DirHashError, Hashable, ObjectHash, copy_and_hash, hash_directory, hash_file};

/// Version of the manifest and marker formats.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const ARTIFACT_HASH_EXCLUSIONS: &[&str] = &[ARTIFACT_COMPLETE_MARKER];

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("artifact not found at {0}")]
  Missing(PathBuf),

  #[error("artifact at {0} is not a regular file")]
  NotAFile(PathBuf),

  #[error("artifact hash mismatch at {path}: expected {expected}, got {actual}")]
  HashMismatch {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  #[error("artifact at {0} is incomplete")]
  Incomplete(PathBuf),

  #[error("invalid artifact manifest {path}: {message}")]
  Manifest { path: PathBuf, message: String },

  #[error("failed to serialize artifact manifest: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error(transparent)]
  Hash(#[from] DirHashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Everything the runtime stage is allowed to know about a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
  pub version: u32,
  pub name: String,
  pub sha256: ContentHash,
  pub size: u64,
  pub executable: bool,
  /// Absolute path of the artifact inside the runtime image.
  pub install_path: String,
  pub platform: Platform,
  pub context_hash: ContentHash,
  pub toolchain: String,
  pub recipe_hash: ObjectHash,
}

impl Hashable for ArtifactManifest {}

/// Marker file content, as in the store's other completion markers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactMarker {
  pub version: u32,
  pub status: String,
  pub output_hash: String,
}

/// Provenance recorded alongside a promoted artifact.
#[derive(Debug, Clone)]
pub struct Provenance {
  pub name: String,
  pub install_path: String,
  pub context_hash: ContentHash,
  pub toolchain: String,
  pub recipe_hash: ObjectHash,
}

/// A verified artifact in the store.
#[derive(Debug, Clone)]
pub struct PromotedArtifact {
  pub manifest: ArtifactManifest,
  pub dir: PathBuf,
}

impl PromotedArtifact {
  /// Path of the executable.
  pub fn path(&self) -> PathBuf {
    self.dir.join(&self.manifest.name)
  }

  /// Re-hash the executable against its manifest.
  pub fn verify(&self) -> Result<(), ArtifactError> {
    verify_file(&self.path(), &self.manifest.sha256)
  }
}

/// Check `path` is a regular file hashing to `expected`.
pub fn verify_file(path: &Path, expected: &ContentHash) -> Result<(), ArtifactError> {
  let metadata = fs::symlink_metadata(path).map_err(|_| ArtifactError::Missing(path.to_path_buf()))?;
  if !metadata.is_file() {
    return Err(ArtifactError::NotAFile(path.to_path_buf()));
  }

  let actual = hash_file(path)?;
  if actual != *expected {
    return Err(ArtifactError::HashMismatch {
      path: path.to_path_buf(),
      expected: expected.0.clone(),
      actual: actual.0,
    });
  }
  Ok(())
}

/// Content-addressed store of promoted artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
}

impl Default for ArtifactStore {
  fn default() -> Self {
    Self::new(artifacts_dir())
  }
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Promote the freshly built executable at `built`.
  ///
  /// An existing complete entry for the same manifest is reused.
  pub fn promote(&self, built: &Path, provenance: Provenance) -> Result<PromotedArtifact, ArtifactError> {
    let metadata = fs::symlink_metadata(built).map_err(|_| ArtifactError::Missing(built.to_path_buf()))?;
    if !metadata.is_file() {
      return Err(ArtifactError::NotAFile(built.to_path_buf()));
    }

    let sha256 = hash_file(built)?;
    let manifest = ArtifactManifest {
      version: ARTIFACT_FORMAT_VERSION,
      name: provenance.name,
      sha256,
      size: metadata.len(),
      executable: true,
      install_path: provenance.install_path,
      platform: Platform::current(),
      context_hash: provenance.context_hash,
      toolchain: provenance.toolchain,
      recipe_hash: provenance.recipe_hash,
    };
    let hash = manifest.compute_hash()?;
    let dir = self.root.join(&hash.0);

    if dir.exists() {
      match self.load_dir(&dir) {
        Ok(existing) if existing.manifest == manifest => {
          debug!(path = %dir.display(), "artifact already promoted");
          return Ok(existing);
        }
        Ok(_) => warn!(path = %dir.display(), "artifact manifest differs, replacing"),
        Err(e) => warn!(path = %dir.display(), error = %e, "removing incomplete artifact"),
      }
      fs::remove_dir_all(&dir)?;
    }

    fs::create_dir_all(&self.root)?;
    let staging = tempfile::Builder::new().prefix(".promote-").tempdir_in(&self.root)?;

    let staged_bin = staging.path().join(&manifest.name);
    let (copied, _) = copy_and_hash(built, &staged_bin)?;
    if copied != manifest.sha256 {
      return Err(ArtifactError::HashMismatch {
        path: built.to_path_buf(),
        expected: manifest.sha256.0.clone(),
        actual: copied.0,
      });
    }
    set_executable(&staged_bin)?;

    let content = serde_json::to_string_pretty(&manifest)?;
    fs::write(staging.path().join(ARTIFACT_MANIFEST_FILE), format!("{}\n", content))?;
    write_marker(staging.path())?;

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, &dir) {
      let _ = fs::remove_dir_all(&staged);
      // A concurrent run promoting the same manifest wins the rename
      if let Ok(existing) = self.load_dir(&dir) {
        return Ok(existing);
      }
      return Err(e.into());
    }

    info!(
      name = %manifest.name,
      sha256 = %manifest.sha256.short(),
      size = manifest.size,
      path = %dir.display(),
      "artifact promoted"
    );

    Ok(PromotedArtifact { manifest, dir })
  }

  /// Load and verify a promoted artifact directory.
  pub fn load_dir(&self, dir: &Path) -> Result<PromotedArtifact, ArtifactError> {
    let marker = read_marker(dir)?.ok_or_else(|| ArtifactError::Incomplete(dir.to_path_buf()))?;
    let current = hash_directory(dir, ARTIFACT_HASH_EXCLUSIONS)?;
    if current.0 != marker.output_hash {
      return Err(ArtifactError::HashMismatch {
        path: dir.to_path_buf(),
        expected: marker.output_hash,
        actual: current.0,
      });
    }

    let manifest_path = dir.join(ARTIFACT_MANIFEST_FILE);
    let content = fs::read_to_string(&manifest_path).map_err(|e| ArtifactError::Manifest {
      path: manifest_path.clone(),
      message: e.to_string(),
    })?;
    let manifest: ArtifactManifest = serde_json::from_str(&content).map_err(|e| ArtifactError::Manifest {
      path: manifest_path.clone(),
      message: e.to_string(),
    })?;

    let artifact = PromotedArtifact {
      manifest,
      dir: dir.to_path_buf(),
    };
    artifact.verify()?;
    Ok(artifact)
  }

  /// Directories currently in the store, including incomplete ones.
  pub fn entries(&self) -> Result<Vec<PathBuf>, ArtifactError> {
    if !self.root.exists() {
      return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(&self.root)? {
      let entry = entry?;
      if entry.file_type()?.is_dir() {
        entries.push(entry.path());
      }
    }
    entries.sort();
    Ok(entries)
  }

  /// Remove every entry, returning what was (or with `dry_run`, would be) removed.
  pub fn clear(&self, dry_run: bool) -> Result<Vec<PathBuf>, ArtifactError> {
    let entries = self.entries()?;
    if !dry_run {
      for dir in &entries {
        fs::remove_dir_all(dir)?;
      }
    }
    if !entries.is_empty() {
      info!(count = entries.len(), dry_run, "removed promoted artifacts");
    }
    Ok(entries)
  }
}

fn write_marker(dir: &Path) -> Result<(), ArtifactError> {
  let output_hash = hash_directory(dir, ARTIFACT_HASH_EXCLUSIONS)?;
  let marker = ArtifactMarker {
    version: ARTIFACT_FORMAT_VERSION,
    status: "complete".to_string(),
    output_hash: output_hash.0,
  };
  let content = serde_json::to_string(&marker)?;
  fs::write(dir.join(ARTIFACT_COMPLETE_MARKER), format!("{}\n", content))?;
  Ok(())
}

/// Read the completion marker. `None` if the directory has none.
pub fn read_marker(dir: &Path) -> Result<Option<ArtifactMarker>, ArtifactError> {
  let path = dir.join(ARTIFACT_COMPLETE_MARKER);
  if !path.exists() {
    return Ok(None);
  }
  let content = fs::read_to_string(&path)?;
  let marker = serde_json::from_str(&content).map_err(|e| ArtifactError::Manifest {
    path,
    message: e.to_string(),
  })?;
  Ok(Some(marker))
}

#[cfg(unix)]
pub(crate) fn set_executable(path: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
pub(crate) fn set_executable(_path: &Path) -> std::io::Result<()> {
  Ok(())
}
