use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::build::cmd::CmdError;
use crate::build::{BuildError, ToolchainError};
use crate::context::ContextError;
use crate::image::ImageError;
use crate::oracle::OracleError;
use crate::recipe::RecipeError;
use crate::secret::SecretError;
use crate::store_lock::StoreLockError;
use crate::util::hash::HashError;

/// Failure classes of a pipeline run, each with a distinct exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Recipe, configuration value or invocation is wrong.
  Configuration,
  /// Toolchain, base image or filesystem is not as required.
  Environment,
  /// The live validation resource could not be reached.
  Unreachable,
  /// The compiler's schema check rejected the source.
  Validation,
  Compilation,
  /// The artifact contract between the stages was violated.
  Handoff,
  /// The configuration value was found in an artifact or image.
  Leak,
  /// Another process holds the store lock.
  Contention,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Configuration => "configuration",
      ErrorKind::Environment => "environment",
      ErrorKind::Unreachable => "unreachable",
      ErrorKind::Validation => "validation",
      ErrorKind::Compilation => "compilation",
      ErrorKind::Handoff => "handoff",
      ErrorKind::Leak => "leak",
      ErrorKind::Contention => "contention",
    }
  }
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error(transparent)]
  Secret(#[from] SecretError),

  #[error(transparent)]
  Context(#[from] ContextError),

  #[error(transparent)]
  Lock(#[from] StoreLockError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Image(#[from] ImageError),

  #[error("output directory {0} already exists (use --force to replace it)")]
  OutputExists(PathBuf),

  #[error("build-time configuration value found in runtime image at {}", location.display())]
  SecretLeak { location: PathBuf },

  #[error("failed to scan runtime image: {0}")]
  Scan(#[source] std::io::Error),

  #[error("failed to hash recipe: {0}")]
  RecipeHash(#[source] HashError),
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Recipe(_) | PipelineError::Secret(_) | PipelineError::OutputExists(_) => ErrorKind::Configuration,
      PipelineError::Context(e) => context_kind(e),
      PipelineError::Lock(e) => match e {
        StoreLockError::Contention { .. } | StoreLockError::ContentionUnknown { .. } => ErrorKind::Contention,
        _ => ErrorKind::Environment,
      },
      PipelineError::Build(e) => build_kind(e),
      PipelineError::Image(e) => image_kind(e),
      PipelineError::SecretLeak { .. } => ErrorKind::Leak,
      PipelineError::Scan(_) | PipelineError::RecipeHash(_) => ErrorKind::Environment,
    }
  }

  /// Process exit code for this failure.
  ///
  /// Compiler failures propagate the compiler's own exit code.
  pub fn exit_code(&self) -> i32 {
    match self.kind() {
      ErrorKind::Configuration => 78,
      ErrorKind::Environment => 69,
      ErrorKind::Unreachable => 68,
      ErrorKind::Validation | ErrorKind::Compilation => self.compiler_code().filter(|code| *code != 0).unwrap_or(1),
      ErrorKind::Handoff | ErrorKind::Leak => 70,
      ErrorKind::Contention => 75,
    }
  }

  /// Redacted compiler diagnostics, if the compiler failed.
  pub fn diagnostics(&self) -> Option<&str> {
    match self {
      PipelineError::Build(e) => e.diagnostics(),
      _ => None,
    }
  }

  fn compiler_code(&self) -> Option<i32> {
    match self {
      PipelineError::Build(e) => e.compiler_code(),
      _ => None,
    }
  }
}

fn context_kind(e: &ContextError) -> ErrorKind {
  match e {
    ContextError::SourceNotFound(_) | ContextError::Unsupported(_) => ErrorKind::Configuration,
    _ => ErrorKind::Environment,
  }
}

fn build_kind(e: &BuildError) -> ErrorKind {
  match e {
    BuildError::Toolchain(ToolchainError::InvalidPath(_)) => ErrorKind::Configuration,
    BuildError::Toolchain(_) => ErrorKind::Environment,
    BuildError::Oracle(OracleError::Unreachable { .. }) => ErrorKind::Unreachable,
    BuildError::Oracle(OracleError::FixtureMissing(_)) => ErrorKind::Configuration,
    BuildError::Context(e) => context_kind(e),
    BuildError::Cmd(CmdError::TimedOut { .. }) => ErrorKind::Compilation,
    BuildError::Workspace(_) | BuildError::Cmd(_) | BuildError::Scan { .. } | BuildError::RecipeHash(_) => {
      ErrorKind::Environment
    }
    BuildError::ValidationFailed { .. } => ErrorKind::Validation,
    BuildError::CompileFailed { .. } => ErrorKind::Compilation,
    BuildError::ArtifactNotProduced(_) | BuildError::Promote(_) => ErrorKind::Handoff,
    BuildError::SecretLeak { .. } => ErrorKind::Leak,
  }
}

fn image_kind(e: &ImageError) -> ErrorKind {
  match e {
    ImageError::OutputExists(_) => ErrorKind::Configuration,
    ImageError::BaseMissing(_) | ImageError::BaseDigestMismatch { .. } => ErrorKind::Environment,
    ImageError::Copy { .. } | ImageError::Hash(_) | ImageError::Serialize(_) | ImageError::Io(_) => {
      ErrorKind::Environment
    }
    ImageError::Handoff(_)
    | ImageError::ContractMismatch { .. }
    | ImageError::Manifest { .. }
    | ImageError::EntrypointMismatch { .. }
    | ImageError::RootfsDigestMismatch { .. }
    | ImageError::UnexpectedEntry(_)
    | ImageError::UnsafePath { .. }
    | ImageError::NotExecutable(_) => ErrorKind::Handoff,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compiler_exit_code_is_propagated() {
    let err = PipelineError::Build(BuildError::CompileFailed {
      code: Some(101),
      diagnostics: "error[E0308]: mismatched types".to_string(),
    });

    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert_eq!(err.exit_code(), 101);
    assert_eq!(err.diagnostics(), Some("error[E0308]: mismatched types"));
  }

  #[test]
  fn signal_terminated_compiler_exits_with_one() {
    let err = PipelineError::Build(BuildError::ValidationFailed {
      code: None,
      diagnostics: String::new(),
    });

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.exit_code(), 1);
  }

  #[test]
  fn missing_secret_is_a_configuration_error() {
    let err = PipelineError::Secret(SecretError::Missing {
      var: "DATABASE_URL".to_string(),
    });

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.exit_code(), 78);
  }

  #[test]
  fn unreachable_resource_has_its_own_code() {
    let err = PipelineError::Build(BuildError::Oracle(OracleError::Unreachable {
      target: "postgres://app:***@db:5432/users".to_string(),
      message: "connection refused".to_string(),
    }));

    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert_eq!(err.exit_code(), 68);
  }

  #[test]
  fn leaks_and_handoff_failures_are_internal_errors() {
    let leak = PipelineError::SecretLeak {
      location: PathBuf::from("rootfs/usr/local/bin/app"),
    };
    let handoff = PipelineError::Build(BuildError::ArtifactNotProduced(PathBuf::from("target/release/app")));

    assert_eq!(leak.exit_code(), 70);
    assert_eq!(handoff.kind(), ErrorKind::Handoff);
    assert_eq!(handoff.exit_code(), 70);
  }

  #[test]
  fn lock_contention_is_temporary_failure() {
    let err = PipelineError::Lock(StoreLockError::ContentionUnknown {
      lock_path: PathBuf::from("/store/.lock"),
    });

    assert_eq!(err.kind(), ErrorKind::Contention);
    assert_eq!(err.exit_code(), 75);
  }
}
