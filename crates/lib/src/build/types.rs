use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::artifact::{ArtifactError, PromotedArtifact};
use crate::build::cmd::CmdError;
use crate::build::toolchain::{ResolvedToolchain, ToolchainError};
use crate::context::ContextError;
use crate::oracle::OracleError;
use crate::secret::SecretFingerprint;
use crate::util::hash::HashError;

/// Errors raised by the build stage.
///
/// Compiler diagnostics carried here are already redacted.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Oracle(#[from] OracleError),

  #[error(transparent)]
  Context(#[from] ContextError),

  #[error("failed to prepare build workspace: {0}")]
  Workspace(#[source] std::io::Error),

  #[error(transparent)]
  Cmd(#[from] CmdError),

  /// The compiler's live schema check rejected the source.
  #[error("schema validation failed (exit code {})", display_code(*.code))]
  ValidationFailed { code: Option<i32>, diagnostics: String },

  #[error("compilation failed (exit code {})", display_code(*.code))]
  CompileFailed { code: Option<i32>, diagnostics: String },

  #[error("compiler succeeded but produced no artifact at {0}")]
  ArtifactNotProduced(PathBuf),

  #[error("build-time configuration value found in {location}")]
  SecretLeak { location: String },

  #[error("failed to scan {path} for leaks: {source}")]
  Scan {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to promote artifact: {0}")]
  Promote(#[from] ArtifactError),

  #[error("failed to hash recipe: {0}")]
  RecipeHash(#[from] HashError),
}

fn display_code(code: Option<i32>) -> String {
  code.map(|c| c.to_string()).unwrap_or_else(|| "none, terminated by signal".to_string())
}

impl BuildError {
  /// Compiler diagnostics, when the failure came from the compiler.
  pub fn diagnostics(&self) -> Option<&str> {
    match self {
      BuildError::ValidationFailed { diagnostics, .. } | BuildError::CompileFailed { diagnostics, .. } => {
        Some(diagnostics)
      }
      _ => None,
    }
  }

  /// Exit code of the compiler, when it exited with one.
  pub fn compiler_code(&self) -> Option<i32> {
    match self {
      BuildError::ValidationFailed { code, .. } | BuildError::CompileFailed { code, .. } => *code,
      _ => None,
    }
  }
}

/// Result of a successful build stage.
#[derive(Debug)]
pub struct BuildOutput {
  pub artifact: PromotedArtifact,
  pub toolchain: ResolvedToolchain,
  /// Detects the build-time value after it has been dropped.
  pub leak_guard: SecretFingerprint,
  pub duration: Duration,
}
