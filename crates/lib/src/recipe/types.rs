use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::recipe::RecipeError;
use crate::util::hash::Hashable;

/// A pipeline recipe: how to compile the service and what its runtime image looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
  pub name: String,
  pub build: BuildDef,
  pub artifact: ArtifactDef,
  pub runtime: RuntimeDef,
}

impl Hashable for Recipe {}

/// The pinned toolchain the build stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainDef {
  /// Program name looked up on `path`, or an absolute path.
  pub program: String,
  /// Version token that must appear in the output of `program <version_args>`.
  pub version: String,
  /// Search path exported as `PATH` to the compiler. Empty means the host `PATH`.
  #[serde(default)]
  pub path: Vec<String>,
  #[serde(default = "default_version_args")]
  pub version_args: Vec<String>,
}

fn default_version_args() -> Vec<String> {
  vec!["--version".to_string()]
}

/// Build stage definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildDef {
  pub toolchain: ToolchainDef,

  /// Arguments passed to the toolchain program.
  #[serde(default)]
  pub args: Vec<String>,

  /// Name of the invoker environment variable holding the connection descriptor.
  pub config_var: String,

  /// Static variables exported to the compiler.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Host variables forwarded to the compiler when set (e.g. `CARGO_HOME`).
  #[serde(default)]
  pub pass_env: Vec<String>,

  /// File and directory names left out of the build context.
  #[serde(default = "default_exclude")]
  pub exclude: Vec<String>,

  /// Diagnostic substrings identifying a failed live-schema check.
  #[serde(default)]
  pub validation_markers: Vec<String>,

  /// Variables exported instead of the descriptor when a schema fixture is used.
  #[serde(default)]
  pub fixture_env: BTreeMap<String, String>,

  /// Kill the compiler after this many seconds.
  #[serde(default)]
  pub timeout_secs: Option<u64>,

  /// Timeout for the reachability probe of the live resource.
  #[serde(default = "default_probe_timeout_ms")]
  pub probe_timeout_ms: u64,
}

fn default_exclude() -> Vec<String> {
  vec!["target".to_string(), ".git".to_string()]
}

fn default_probe_timeout_ms() -> u64 {
  5_000
}

/// The single artifact the build produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactDef {
  /// File name of the executable.
  pub name: String,
  /// Location of the executable relative to the build context after compiling.
  pub path: String,
}

/// Runtime image definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeDef {
  /// Pinned base root filesystem. Absent means an empty (scratch) base.
  #[serde(default)]
  pub base: Option<BaseDef>,

  /// Absolute path of the artifact inside the image; also the entrypoint.
  pub install_path: String,

  #[serde(default)]
  pub env: BTreeMap<String, String>,

  #[serde(default = "default_workdir")]
  pub workdir: String,

  #[serde(default)]
  pub expose: Vec<u16>,

  #[serde(default)]
  pub user: Option<String>,
}

fn default_workdir() -> String {
  "/".to_string()
}

/// A base root filesystem pinned by its directory digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseDef {
  /// Directory, relative to the recipe.
  pub path: String,
  /// Expected `hash_directory` digest (64 hex characters).
  pub digest: String,
}

impl Recipe {
  /// Check the recipe for inconsistencies before anything runs.
  pub fn validate(&self) -> Result<(), RecipeError> {
    if self.name.trim().is_empty() {
      return Err(invalid("name", "must not be empty"));
    }

    let toolchain = &self.build.toolchain;
    if toolchain.program.trim().is_empty() {
      return Err(invalid("build.toolchain.program", "must not be empty"));
    }
    if toolchain.version.trim().is_empty() {
      return Err(invalid("build.toolchain.version", "a pinned version is required"));
    }

    let var = &self.build.config_var;
    if !is_env_name(var) {
      return Err(invalid("build.config_var", format!("'{}' is not a valid variable name", var)));
    }
    if self.build.env.contains_key(var) {
      return Err(invalid("build.env", format!("must not set {}; it is read from the invoker", var)));
    }
    if self.build.pass_env.iter().any(|name| name == var) {
      return Err(invalid("build.pass_env", format!("must not forward {}", var)));
    }
    if self.build.fixture_env.contains_key(var) {
      return Err(invalid("build.fixture_env", format!("must not set {}", var)));
    }
    if let Some(name) = self.build.pass_env.iter().find(|name| !is_env_name(name)) {
      return Err(invalid("build.pass_env", format!("'{}' is not a valid variable name", name)));
    }
    if self.build.timeout_secs == Some(0) {
      return Err(invalid("build.timeout_secs", "must be greater than zero"));
    }

    let artifact = &self.artifact;
    if artifact.name.is_empty() || artifact.name.contains(['/', '\\']) || artifact.name == "." || artifact.name == ".." {
      return Err(invalid("artifact.name", "must be a plain file name"));
    }
    if !is_contained_relative(Path::new(&artifact.path)) {
      return Err(invalid("artifact.path", "must be a relative path inside the build context"));
    }

    let runtime = &self.runtime;
    if !runtime.install_path.starts_with('/') {
      return Err(invalid("runtime.install_path", "must be absolute"));
    }
    if !is_contained_relative(Path::new(runtime.install_path.trim_start_matches('/'))) {
      return Err(invalid("runtime.install_path", "must not contain '..'"));
    }
    if Path::new(&runtime.install_path).file_name().and_then(|n| n.to_str()) != Some(artifact.name.as_str()) {
      return Err(invalid(
        "runtime.install_path",
        format!("must end with the artifact name '{}'", artifact.name),
      ));
    }
    if !runtime.workdir.starts_with('/') {
      return Err(invalid("runtime.workdir", "must be absolute"));
    }
    let workdir = runtime.workdir.trim_start_matches('/');
    if !workdir.is_empty() && !is_contained_relative(Path::new(workdir)) {
      return Err(invalid("runtime.workdir", "must not contain '..'"));
    }
    if runtime.env.contains_key(var) {
      return Err(invalid(
        "runtime.env",
        format!("must not define {}; the build-time value never reaches the image", var),
      ));
    }
    if let Some(base) = &runtime.base {
      if base.digest.len() != 64 || !base.digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("runtime.base.digest", "must be a 64 character hex digest"));
      }
    }

    Ok(())
  }
}

/// A validated recipe together with where it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
  pub recipe: Recipe,
  /// Directory of the recipe file; relative recipe paths resolve against it.
  pub dir: PathBuf,
  pub path: PathBuf,
}

impl LoadedRecipe {
  pub fn resolve(&self, relative: &str) -> PathBuf {
    self.dir.join(relative)
  }
}

impl std::ops::Deref for LoadedRecipe {
  type Target = Recipe;

  fn deref(&self) -> &Recipe {
    &self.recipe
  }
}

fn invalid(field: &str, message: impl Into<String>) -> RecipeError {
  RecipeError::Invalid {
    field: field.to_string(),
    message: message.into(),
  }
}

fn is_env_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
    _ => false,
  }
}

fn is_contained_relative(path: &Path) -> bool {
  !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
