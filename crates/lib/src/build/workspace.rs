//! Per-run build workspaces.
//!
//! ```text
//! work/run-<random>/
//! ├── src/    # materialized build context, compiler cwd
//! └── tmp/    # TMPDIR for the toolchain
//! ```
//!
//! A workspace is removed when dropped, so a failed or abandoned stage leaves
//! nothing behind. Only a killed orchestrator can leave one; `sweep_workspaces`
//! removes those.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

const WORKSPACE_PREFIX: &str = "run-";

#[derive(Debug)]
pub struct Workspace {
  dir: TempDir,
}

impl Workspace {
  pub fn create(work_root: &Path) -> io::Result<Self> {
    fs::create_dir_all(work_root)?;
    let dir = tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir_in(work_root)?;
    fs::create_dir(dir.path().join("tmp"))?;
    debug!(path = %dir.path().display(), "created build workspace");
    Ok(Self { dir })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn src_dir(&self) -> PathBuf {
    self.dir.path().join("src")
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.dir.path().join("tmp")
  }

  /// Remove the workspace, reporting failures instead of ignoring them.
  pub fn close(self) -> io::Result<()> {
    let path = self.dir.path().to_path_buf();
    self.dir.close()?;
    debug!(path = %path.display(), "removed build workspace");
    Ok(())
  }
}

/// Remove workspaces left behind by abandoned runs.
///
/// Callers must hold the store lock exclusively so no live run is affected.
pub fn sweep_workspaces(work_root: &Path, dry_run: bool) -> io::Result<Vec<PathBuf>> {
  if !work_root.exists() {
    return Ok(Vec::new());
  }

  let mut removed = Vec::new();
  for entry in fs::read_dir(work_root)? {
    let entry = entry?;
    let name = entry.file_name();
    if !entry.file_type()?.is_dir() || !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
      continue;
    }
    if !dry_run {
      fs::remove_dir_all(entry.path())?;
    }
    removed.push(entry.path());
  }
  removed.sort();

  if !removed.is_empty() {
    info!(count = removed.len(), dry_run, "swept stale workspaces");
  }
  Ok(removed)
}
