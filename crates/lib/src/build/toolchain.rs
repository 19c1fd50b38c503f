//! Pinned toolchain resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::build::cmd::{CmdError, isolated_command, run_captured};
use crate::recipe::ToolchainDef;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("toolchain program '{program}' not found on {search_path}")]
  NotFound { program: String, search_path: String },

  #[error("invalid toolchain search path: {0}")]
  InvalidPath(String),

  #[error("toolchain version probe failed: {0}")]
  Probe(#[from] CmdError),

  #[error("'{program}' version probe exited with code {code:?}")]
  ProbeFailed { program: String, code: Option<i32> },

  #[error("toolchain version mismatch for '{program}': expected {expected}, found '{found}'")]
  VersionMismatch {
    program: String,
    expected: String,
    found: String,
  },
}

/// A located toolchain whose version matched the pin.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedToolchain {
  pub program: PathBuf,
  pub version: String,
  /// First line of the version probe output.
  pub reported: String,
  #[serde(skip)]
  pub search_path: OsString,
}

/// The `PATH` exported to the compiler.
///
/// Relative entries resolve against `base` (the recipe directory). An empty
/// declared path falls back to the host `PATH`.
pub fn search_path(def: &ToolchainDef, base: &Path) -> Result<OsString, ToolchainError> {
  if def.path.is_empty() {
    return Ok(std::env::var_os("PATH").unwrap_or_default());
  }
  let entries = def.path.iter().map(|entry| {
    let entry = Path::new(entry);
    if entry.is_absolute() { entry.to_path_buf() } else { base.join(entry) }
  });
  std::env::join_paths(entries).map_err(|e| ToolchainError::InvalidPath(e.to_string()))
}

/// Locate `program` on `search_path`.
///
/// A program containing a separator is not searched for: an absolute path
/// is taken as-is and a relative one resolves against `base`, like relative
/// search path entries do.
pub fn find_program(program: &str, base: &Path, search_path: &OsString) -> Option<PathBuf> {
  let direct = Path::new(program);
  if direct.components().count() > 1 {
    let direct = if direct.is_absolute() { direct.to_path_buf() } else { base.join(direct) };
    return is_runnable(&direct).then_some(direct);
  }

  std::env::split_paths(search_path).find_map(|dir| {
    let candidate = dir.join(program);
    if is_runnable(&candidate) {
      return Some(candidate);
    }
    #[cfg(windows)]
    {
      let exe = dir.join(format!("{}.exe", program));
      if is_runnable(&exe) {
        return Some(exe);
      }
    }
    None
  })
}

fn is_runnable(path: &Path) -> bool {
  path.is_file() && crate::util::hash::is_executable(path)
}

/// Whether `version` appears as a whole token of `output` (a leading `v` is allowed).
pub fn version_matches(output: &str, version: &str) -> bool {
  output
    .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';' | '"' | '\''))
    .map(|token| token.strip_prefix('v').unwrap_or(token))
    .any(|token| token == version)
}

/// Locate the pinned toolchain and confirm its version.
///
/// The probe runs in the same isolated environment as the compiler.
pub async fn resolve_toolchain(
  def: &ToolchainDef,
  base: &Path,
  tmp_dir: &Path,
) -> Result<ResolvedToolchain, ToolchainError> {
  let search_path = search_path(def, base)?;
  let program = find_program(&def.program, base, &search_path).ok_or_else(|| ToolchainError::NotFound {
    program: def.program.clone(),
    search_path: search_path.to_string_lossy().into_owned(),
  })?;

  debug!(program = %program.display(), args = ?def.version_args, "probing toolchain version");

  let mut command = isolated_command(&program, tmp_dir, tmp_dir, &search_path);
  command.args(&def.version_args);
  let output = run_captured(command, str::to_string, Some(PROBE_TIMEOUT)).await?;

  if !output.success {
    return Err(ToolchainError::ProbeFailed {
      program: def.program.clone(),
      code: output.code,
    });
  }

  let text = output.diagnostics();
  let reported = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().trim().to_string();

  if !version_matches(&text, &def.version) {
    return Err(ToolchainError::VersionMismatch {
      program: def.program.clone(),
      expected: def.version.clone(),
      found: reported,
    });
  }

  info!(program = %program.display(), version = %def.version, "toolchain resolved");

  Ok(ResolvedToolchain {
    program,
    version: def.version.clone(),
    reported,
    search_path,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn version_must_be_a_whole_token() {
    assert!(version_matches("cargo 1.80.0 (376290515 2024-07-16)", "1.80.0"));
    assert!(version_matches("go version go1.22.1 linux/amd64\nv1.22.1", "1.22.1"));
    assert!(version_matches("rustc v1.80.0", "1.80.0"));
    assert!(!version_matches("cargo 1.80.01", "1.80.0"));
    assert!(!version_matches("cargo 11.80.0", "1.80.0"));
    assert!(!version_matches("", "1.80.0"));
  }

  #[cfg(unix)]
  mod unix {
    use super::super::*;
    use crate::util::testutil::{sample_recipe, write_fake_toolchain};
    use tempfile::TempDir;

    fn def_for(dir: &Path, version: &str) -> ToolchainDef {
      let mut def = sample_recipe().build.toolchain;
      def.path = vec![dir.to_string_lossy().into_owned()];
      def.version = version.to_string();
      def
    }

    #[tokio::test]
    async fn resolves_program_on_declared_path() {
      let temp = TempDir::new().unwrap();
      let bin = temp.path().join("bin");
      write_fake_toolchain(&bin);

      let resolved = resolve_toolchain(&def_for(&bin, "1.80.0"), temp.path(), temp.path())
        .await
        .unwrap();

      assert_eq!(resolved.program, bin.join("cargo"));
      assert_eq!(resolved.reported, "cargo 1.80.0 (stagehand-test)");
    }

    #[tokio::test]
    async fn relative_path_entries_resolve_against_base() {
      let temp = TempDir::new().unwrap();
      write_fake_toolchain(&temp.path().join("tools"));
      let mut def = def_for(temp.path(), "1.80.0");
      def.path = vec!["tools".to_string()];

      let resolved = resolve_toolchain(&def, temp.path(), temp.path()).await.unwrap();

      assert_eq!(resolved.program, temp.path().join("tools").join("cargo"));
    }

    #[tokio::test]
    async fn relative_program_resolves_against_base_not_cwd() {
      let temp = TempDir::new().unwrap();
      write_fake_toolchain(&temp.path().join("toolchain"));
      let mut def = def_for(temp.path(), "1.80.0");
      def.program = "./toolchain/cargo".to_string();

      let resolved = resolve_toolchain(&def, temp.path(), temp.path()).await.unwrap();

      assert_eq!(resolved.program, temp.path().join("./toolchain/cargo"));
      assert!(resolved.program.is_absolute());
    }

    #[tokio::test]
    async fn version_mismatch_is_an_error() {
      let temp = TempDir::new().unwrap();
      let bin = temp.path().join("bin");
      write_fake_toolchain(&bin);

      let result = resolve_toolchain(&def_for(&bin, "1.79.0"), temp.path(), temp.path()).await;

      assert!(matches!(result, Err(ToolchainError::VersionMismatch { .. })));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
      let temp = TempDir::new().unwrap();

      let result = resolve_toolchain(&def_for(temp.path(), "1.80.0"), temp.path(), temp.path()).await;

      assert!(matches!(result, Err(ToolchainError::NotFound { .. })));
    }
  }
}
