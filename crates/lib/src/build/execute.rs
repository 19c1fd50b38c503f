//! The build stage.
//!
//! Turns a build context into exactly one promoted artifact, or fails. The
//! oracle (and with it the build-time configuration value) is owned by this
//! stage and dropped when it returns.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::artifact::{ArtifactStore, Provenance};
use crate::build::cmd::{CmdOutput, isolated_command, run_captured};
use crate::build::toolchain::resolve_toolchain;
use crate::build::types::{BuildError, BuildOutput};
use crate::build::workspace::Workspace;
use crate::context::BuildContext;
use crate::oracle::ValidationOracle;
use crate::platform::paths::store_dir;
use crate::recipe::{BuildDef, LoadedRecipe};
use crate::util::hash::Hashable;

/// Where the build stage keeps its workspaces and artifacts.
#[derive(Debug, Clone)]
pub struct BuildStageConfig {
  pub work_root: PathBuf,
  pub artifacts: ArtifactStore,
}

impl BuildStageConfig {
  /// Workspaces under `<store>/work`, artifacts under `<store>/artifacts`.
  pub fn in_store(store: &Path) -> Self {
    Self {
      work_root: store.join("work"),
      artifacts: ArtifactStore::new(store.join("artifacts")),
    }
  }
}

impl Default for BuildStageConfig {
  fn default() -> Self {
    Self::in_store(&store_dir())
  }
}

/// Run the build stage.
///
/// Steps, each fatal on failure:
/// 1. resolve the pinned toolchain
/// 2. preflight the oracle
/// 3. materialize the context into a fresh workspace
/// 4. compile with the oracle's variables exported to the compiler only
/// 5. locate the artifact and scan it for the build-time value
/// 6. promote it into the artifact store
///
/// The workspace is removed whether or not the stage succeeds.
pub async fn execute_build_stage<O: ValidationOracle>(
  recipe: &LoadedRecipe,
  context: &BuildContext,
  oracle: O,
  config: &BuildStageConfig,
) -> Result<BuildOutput, BuildError> {
  let start = Instant::now();
  let build = &recipe.build;

  info!(recipe = %recipe.name, oracle = %oracle.describe(), "starting build stage");

  let workspace = Workspace::create(&config.work_root).map_err(BuildError::Workspace)?;

  let toolchain = resolve_toolchain(&build.toolchain, &recipe.dir, &workspace.tmp_dir()).await?;

  oracle.preflight().await?;

  let src_dir = workspace.src_dir();
  context.materialize(&src_dir)?;

  let mut command = isolated_command(&toolchain.program, &src_dir, &workspace.tmp_dir(), &toolchain.search_path);
  command.args(&build.args);
  for name in &build.pass_env {
    if let Some(value) = std::env::var_os(name) {
      command.env(name, value);
    }
  }
  for (key, value) in &build.env {
    command.env(key, value);
  }
  oracle.apply_env(&mut command);

  info!(program = %toolchain.program.display(), args = ?build.args, "compiling");
  let timeout = build.timeout_secs.map(Duration::from_secs);
  let output = run_captured(command, |line| oracle.redact(line), timeout).await?;

  if !output.success {
    return Err(classify_failure(build, output));
  }

  let built = src_dir.join(&recipe.artifact.path);
  if !built.is_file() {
    return Err(BuildError::ArtifactNotProduced(PathBuf::from(&recipe.artifact.path)));
  }

  let leak_guard = oracle.leak_guard();
  let leaked = leak_guard.scan_file(&built).map_err(|source| BuildError::Scan {
    path: built.clone(),
    source,
  })?;
  if leaked {
    return Err(BuildError::SecretLeak {
      location: format!("artifact {}", recipe.artifact.path),
    });
  }

  let provenance = Provenance {
    name: recipe.artifact.name.clone(),
    install_path: recipe.runtime.install_path.clone(),
    context_hash: context.hash.clone(),
    toolchain: toolchain.version.clone(),
    recipe_hash: recipe.recipe.compute_hash()?,
  };
  let artifact = config.artifacts.promote(&built, provenance)?;

  drop(oracle);
  debug!("build-time configuration released");

  if let Err(e) = workspace.close() {
    warn!(error = %e, "failed to remove build workspace");
  }

  let duration = start.elapsed();
  info!(
    artifact = %artifact.manifest.name,
    sha256 = %artifact.manifest.sha256.short(),
    duration = ?duration,
    "build stage complete"
  );

  Ok(BuildOutput {
    artifact,
    toolchain,
    leak_guard,
    duration,
  })
}

/// Tell a rejected schema check apart from an ordinary compile error.
fn classify_failure(build: &BuildDef, output: CmdOutput) -> BuildError {
  let diagnostics = output.diagnostics();
  let is_validation = build
    .validation_markers
    .iter()
    .any(|marker| !marker.is_empty() && diagnostics.contains(marker.as_str()));

  if is_validation {
    warn!(code = ?output.code, "schema validation failed");
    BuildError::ValidationFailed {
      code: output.code,
      diagnostics,
    }
  } else {
    warn!(code = ?output.code, "compilation failed");
    BuildError::CompileFailed {
      code: output.code,
      diagnostics,
    }
  }
}
