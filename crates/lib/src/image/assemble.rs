use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::{ArtifactError, PromotedArtifact, set_executable, verify_file};
use crate::consts::{IMAGE_MANIFEST_FILE, IMAGE_ROOTFS_DIR};
use crate::image::ImageError;
use crate::image::types::{BaseImage, IMAGE_FORMAT_VERSION, ImageArtifact, ImageManifest, RuntimeImage, rootfs_of};
use crate::recipe::LoadedRecipe;
use crate::util::hash::{copy_and_hash, hash_directory, is_executable};

/// Assemble the runtime image for `artifact` at `out`.
///
/// The image is staged in a sibling directory and renamed into place only
/// after it verifies, so a failed assembly leaves nothing at `out`.
pub fn assemble_image(
  recipe: &LoadedRecipe,
  artifact: &PromotedArtifact,
  out: &Path,
  force: bool,
) -> Result<RuntimeImage, ImageError> {
  let runtime = &recipe.runtime;
  let contract = &artifact.manifest;

  artifact.verify()?;
  if contract.install_path != runtime.install_path {
    return Err(ImageError::ContractMismatch {
      field: "install_path",
      expected: runtime.install_path.clone(),
      actual: contract.install_path.clone(),
    });
  }
  if contract.name != recipe.artifact.name {
    return Err(ImageError::ContractMismatch {
      field: "name",
      expected: recipe.artifact.name.clone(),
      actual: contract.name.clone(),
    });
  }

  if out.exists() && !force {
    return Err(ImageError::OutputExists(out.to_path_buf()));
  }

  let parent = match out.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  fs::create_dir_all(&parent)?;
  let staging = tempfile::Builder::new().prefix(".stagehand-image-").tempdir_in(&parent)?;
  let rootfs = staging.path().join(IMAGE_ROOTFS_DIR);
  fs::create_dir(&rootfs)?;

  let base = match &runtime.base {
    Some(base) => {
      let base_dir = recipe.resolve(&base.path);
      if !base_dir.is_dir() {
        return Err(ImageError::BaseMissing(base_dir));
      }
      let actual = hash_directory(&base_dir, &[])?;
      if !actual.0.eq_ignore_ascii_case(&base.digest) {
        return Err(ImageError::BaseDigestMismatch {
          path: base_dir,
          expected: base.digest.clone(),
          actual: actual.0,
        });
      }
      copy_tree(&base_dir, &rootfs)?;
      debug!(base = %base_dir.display(), "copied pinned base");
      BaseImage::Pinned { digest: actual.0 }
    }
    None => BaseImage::Scratch,
  };

  let install = Path::new(runtime.install_path.trim_start_matches('/'));
  let file_name = install.file_name().ok_or_else(|| ImageError::UnsafePath {
    path: install.to_path_buf(),
    reason: "install path has no file name",
  })?;
  let target = create_contained_dir(&rootfs, install.parent().unwrap_or(Path::new("")))?.join(file_name);
  if fs::symlink_metadata(&target).is_ok() {
    // The artifact replaces whatever the base had at its path
    remove_any(&target)?;
  }
  let (copied, size) = copy_and_hash(&artifact.path(), &target)?;
  if copied != contract.sha256 {
    return Err(ImageError::Handoff(ArtifactError::HashMismatch {
      path: target,
      expected: contract.sha256.0.clone(),
      actual: copied.0,
    }));
  }
  set_executable(&target)?;

  create_contained_dir(&rootfs, Path::new(runtime.workdir.trim_start_matches('/')))?;

  let manifest = ImageManifest {
    version: IMAGE_FORMAT_VERSION,
    name: recipe.name.clone(),
    platform: contract.platform.clone(),
    base,
    artifact: ImageArtifact {
      name: contract.name.clone(),
      path: runtime.install_path.clone(),
      sha256: contract.sha256.clone(),
      size,
    },
    entrypoint: vec![runtime.install_path.clone()],
    env: runtime.env.clone(),
    workdir: runtime.workdir.clone(),
    expose: runtime.expose.clone(),
    user: runtime.user.clone(),
    rootfs_digest: hash_directory(&rootfs, &[])?,
  };
  let content = serde_json::to_string_pretty(&manifest)?;
  fs::write(staging.path().join(IMAGE_MANIFEST_FILE), format!("{}\n", content))?;

  verify_image(staging.path())?;

  if out.exists() {
    debug!(path = %out.display(), "replacing existing image");
    remove_any(out)?;
  }
  let staged = staging.keep();
  if let Err(e) = fs::rename(&staged, out) {
    let _ = fs::remove_dir_all(&staged);
    return Err(e.into());
  }

  info!(
    name = %manifest.name,
    path = %out.display(),
    rootfs_digest = %manifest.rootfs_digest.short(),
    "runtime image assembled"
  );

  Ok(RuntimeImage {
    dir: out.to_path_buf(),
    manifest,
  })
}

/// Read `image.json` without verifying the image.
pub fn load_image(dir: &Path) -> Result<RuntimeImage, ImageError> {
  let path = dir.join(IMAGE_MANIFEST_FILE);
  let content = fs::read_to_string(&path).map_err(|e| ImageError::Manifest {
    path: path.clone(),
    message: e.to_string(),
  })?;
  let manifest = serde_json::from_str(&content).map_err(|e| ImageError::Manifest {
    path: path.clone(),
    message: e.to_string(),
  })?;
  Ok(RuntimeImage {
    dir: dir.to_path_buf(),
    manifest,
  })
}

/// Check an image holds exactly what its manifest claims.
///
/// - only `image.json` and `rootfs/` at the top level
/// - the entrypoint is the artifact, with no arguments
/// - the artifact is a regular file reached without crossing a symlink
/// - the artifact is present, executable and hashes to the manifest's sha256
/// - the root filesystem hashes to `rootfs_digest`
pub fn verify_image(dir: &Path) -> Result<RuntimeImage, ImageError> {
  let image = load_image(dir)?;
  let manifest = &image.manifest;

  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let name = entry.file_name();
    if name != IMAGE_MANIFEST_FILE && name != IMAGE_ROOTFS_DIR {
      return Err(ImageError::UnexpectedEntry(entry.path()));
    }
  }

  if manifest.entrypoint != [manifest.artifact.path.clone()] {
    return Err(ImageError::EntrypointMismatch {
      expected: manifest.artifact.path.clone(),
      actual: manifest.entrypoint.clone(),
    });
  }

  let artifact = contained_path(&rootfs_of(dir), Path::new(manifest.artifact.path.trim_start_matches('/')))?;
  let is_file = fs::symlink_metadata(&artifact).map(|m| m.is_file()).unwrap_or(false);
  if !is_file && artifact.exists() {
    return Err(ImageError::UnsafePath {
      path: artifact,
      reason: "artifact is not a regular file",
    });
  }
  verify_file(&artifact, &manifest.artifact.sha256)?;
  if !is_executable(&artifact) {
    return Err(ImageError::NotExecutable(artifact));
  }

  let actual = hash_directory(&rootfs_of(dir), &[])?;
  if actual != manifest.rootfs_digest {
    return Err(ImageError::RootfsDigestMismatch {
      expected: manifest.rootfs_digest.0.clone(),
      actual: actual.0,
    });
  }

  Ok(image)
}

/// Create `relative` below `rootfs` one component at a time.
///
/// A symlink copied from the base may point anywhere on the host, so no
/// component is allowed to be one.
fn create_contained_dir(rootfs: &Path, relative: &Path) -> Result<PathBuf, ImageError> {
  let mut current = rootfs.to_path_buf();
  for component in relative.components() {
    let Component::Normal(name) = component else {
      return Err(ImageError::UnsafePath {
        path: relative.to_path_buf(),
        reason: "must not contain '..' or a root",
      });
    };
    current.push(name);
    match fs::symlink_metadata(&current) {
      Ok(metadata) if metadata.file_type().is_symlink() => {
        return Err(ImageError::UnsafePath {
          path: current,
          reason: "crosses a symlink",
        });
      }
      Ok(metadata) if metadata.is_dir() => {}
      Ok(_) => {
        return Err(ImageError::UnsafePath {
          path: current,
          reason: "is not a directory",
        });
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => fs::create_dir(&current)?,
      Err(e) => return Err(e.into()),
    }
  }
  Ok(current)
}

/// Host path of `relative` below `rootfs`, refusing symlinked parents.
fn contained_path(rootfs: &Path, relative: &Path) -> Result<PathBuf, ImageError> {
  let mut current = rootfs.to_path_buf();
  let mut components = relative.components().peekable();
  while let Some(component) = components.next() {
    let Component::Normal(name) = component else {
      return Err(ImageError::UnsafePath {
        path: relative.to_path_buf(),
        reason: "must not contain '..' or a root",
      });
    };
    current.push(name);
    if components.peek().is_some() {
      let crosses = fs::symlink_metadata(&current)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
      if crosses {
        return Err(ImageError::UnsafePath {
          path: current,
          reason: "crosses a symlink",
        });
      }
    }
  }
  Ok(current)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), ImageError> {
  let copy_err = |path: &Path, e: std::io::Error| ImageError::Copy {
    path: path.to_path_buf(),
    message: e.to_string(),
  };

  for entry in WalkDir::new(src).sort_by_file_name().min_depth(1) {
    let entry = entry.map_err(|e| ImageError::Copy {
      path: src.to_path_buf(),
      message: e.to_string(),
    })?;
    let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target).map_err(|e| copy_err(entry.path(), e))?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target).map_err(|e| copy_err(entry.path(), e))?;
    } else if file_type.is_symlink() {
      copy_symlink(entry.path(), &target).map_err(|e| copy_err(entry.path(), e))?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
  let target = fs::read_link(src)?;
  std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
  fs::copy(src, dst).map(|_| ())
}

fn remove_any(path: &Path) -> std::io::Result<()> {
  let metadata = fs::symlink_metadata(path)?;
  if metadata.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
}
