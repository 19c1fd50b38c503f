use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::util::hash::ContentHash;

/// Version of the image manifest format.
pub const IMAGE_FORMAT_VERSION: u32 = 1;

/// What the root filesystem was started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseImage {
  /// Empty root filesystem.
  Scratch,
  /// A pinned directory, identified by its digest only.
  Pinned { digest: String },
}

/// The single executable carried into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
  pub name: String,
  /// Absolute path inside the root filesystem.
  pub path: String,
  pub sha256: ContentHash,
  pub size: u64,
}

/// `image.json`: how to run the image. Carries no timestamps, so identical
/// inputs produce identical manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
  pub version: u32,
  pub name: String,
  pub platform: Platform,
  pub base: BaseImage,
  pub artifact: ImageArtifact,
  /// Process invocation: the artifact, with no arguments.
  pub entrypoint: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub workdir: String,
  pub expose: Vec<u16>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub user: Option<String>,
  pub rootfs_digest: ContentHash,
}

/// A runtime image on disk.
#[derive(Debug, Clone)]
pub struct RuntimeImage {
  pub dir: PathBuf,
  pub manifest: ImageManifest,
}

impl RuntimeImage {
  pub fn rootfs(&self) -> PathBuf {
    rootfs_of(&self.dir)
  }

  /// Host path of the artifact inside the image.
  pub fn artifact_path(&self) -> PathBuf {
    self.rootfs().join(self.manifest.artifact.path.trim_start_matches('/'))
  }
}

pub(crate) fn rootfs_of(dir: &Path) -> PathBuf {
  dir.join(crate::consts::IMAGE_ROOTFS_DIR)
}
