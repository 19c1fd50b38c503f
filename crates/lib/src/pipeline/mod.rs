//! Stage sequencing.
//!
//! Runs the build stage and the runtime image assembler strictly in order,
//! with the artifact contract as the only thing passed between them, and
//! confirms the finished image before reporting success.

mod error;

pub use error::{ErrorKind, PipelineError};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::artifact::ArtifactManifest;
use crate::build::{BuildStageConfig, ResolvedToolchain, execute_build_stage};
use crate::context::BuildContext;
use crate::image::{ImageManifest, assemble_image, verify_image};
use crate::oracle::{FixtureOracle, LiveOracle, ValidationOracle};
use crate::platform::paths::store_dir;
use crate::recipe::LoadedRecipe;
use crate::secret::BuildSecret;
use crate::store_lock::{LockMode, StoreLock};
use crate::util::hash::{ContentHash, Hashable, ObjectHash};

/// How a pipeline run is invoked.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
  /// Source directory. Defaults to the recipe's directory.
  pub source: Option<PathBuf>,
  /// Where the runtime image is written.
  pub out: PathBuf,
  /// Replace an existing image at `out`.
  pub force: bool,
  /// Validate against this schema fixture instead of the live resource.
  pub schema_fixture: Option<PathBuf>,
  pub store: PathBuf,
}

impl PipelineOptions {
  pub fn new(out: impl Into<PathBuf>) -> Self {
    Self {
      source: None,
      out: out.into(),
      force: false,
      schema_fixture: None,
      store: store_dir(),
    }
  }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
  pub recipe: String,
  pub recipe_hash: ObjectHash,
  /// `live` or `fixture`.
  pub oracle: &'static str,
  pub context_hash: ContentHash,
  pub context_files: usize,
  pub toolchain: ResolvedToolchain,
  pub artifact: ArtifactManifest,
  pub artifact_dir: PathBuf,
  pub image: PathBuf,
  pub image_manifest: ImageManifest,
  #[serde(rename = "duration_ms", serialize_with = "as_millis")]
  pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

/// Run both stages for `recipe`.
///
/// The build-time configuration value is read first, so a missing value fails
/// before anything is snapshotted, locked or compiled. With a schema fixture
/// the value is not read at all.
pub async fn run_pipeline(recipe: &LoadedRecipe, options: &PipelineOptions) -> Result<PipelineReport, PipelineError> {
  match &options.schema_fixture {
    Some(dir) => {
      // The compiler runs inside the workspace, so it needs an absolute fixture path
      let dir = dunce::canonicalize(dir).unwrap_or_else(|_| dir.clone());
      let oracle = FixtureOracle::new(&dir, recipe.build.fixture_env.clone());
      run_with_oracle(recipe, options, oracle, "fixture").await
    }
    None => {
      let secret = BuildSecret::from_env(&recipe.build.config_var)?;
      let oracle = LiveOracle::new(secret, Duration::from_millis(recipe.build.probe_timeout_ms));
      run_with_oracle(recipe, options, oracle, "live").await
    }
  }
}

/// Run both stages with an explicit oracle, which is consumed by the build stage.
pub async fn run_with_oracle<O: ValidationOracle>(
  recipe: &LoadedRecipe,
  options: &PipelineOptions,
  oracle: O,
  oracle_kind: &'static str,
) -> Result<PipelineReport, PipelineError> {
  let start = Instant::now();
  let recipe_hash = recipe.recipe.compute_hash().map_err(PipelineError::RecipeHash)?;

  if options.out.exists() && !options.force {
    return Err(PipelineError::OutputExists(options.out.clone()));
  }

  let source = options.source.clone().unwrap_or_else(|| recipe.dir.clone());
  let context = BuildContext::snapshot(&source, &recipe.build.exclude)?;

  let _lock = StoreLock::acquire_in(&options.store, LockMode::Shared, "build")?;

  info!(recipe = %recipe.name, oracle = oracle_kind, "running pipeline");

  let built = execute_build_stage(recipe, &context, oracle, &BuildStageConfig::in_store(&options.store)).await?;

  let image = assemble_image(recipe, &built.artifact, &options.out, options.force)?;

  let leaked = built
    .leak_guard
    .scan_dir(&image.dir)
    .map_err(PipelineError::Scan)?;
  if let Some(location) = leaked {
    error!(path = %location.display(), "build-time configuration value found in runtime image");
    let relative = location.strip_prefix(&image.dir).unwrap_or(&location).to_path_buf();
    discard_image(&image.dir);
    return Err(PipelineError::SecretLeak { location: relative });
  }

  let image = verify_image(&image.dir)?;

  let duration = start.elapsed();
  info!(
    image = %image.dir.display(),
    artifact = %image.manifest.artifact.path,
    duration = %format!("{:.2?}", duration),
    "pipeline complete"
  );

  Ok(PipelineReport {
    recipe: recipe.name.clone(),
    recipe_hash,
    oracle: oracle_kind,
    context_hash: context.hash.clone(),
    context_files: context.file_count(),
    toolchain: built.toolchain,
    artifact: built.artifact.manifest,
    artifact_dir: built.artifact.dir,
    image: image.dir,
    image_manifest: image.manifest,
    duration,
  })
}

fn discard_image(dir: &Path) {
  if let Err(e) = std::fs::remove_dir_all(dir) {
    error!(path = %dir.display(), error = %e, "failed to remove leaking image");
  }
}
