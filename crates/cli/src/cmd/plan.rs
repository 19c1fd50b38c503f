//! Implementation of the `stagehand plan` command.
//!
//! Evaluates a recipe and reports what a build would do: the pinned toolchain
//! and whether it resolves, whether the build-time configuration variable is
//! set, and the artifact and image it would produce. The variable's value is
//! never printed.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use stagehand_lib::build::{ResolvedToolchain, resolve_toolchain};
use stagehand_lib::pipeline::PipelineError;
use stagehand_lib::recipe::{ArtifactDef, RuntimeDef, load_recipe};
use stagehand_lib::secret::{BuildSecret, SecretError};
use stagehand_lib::util::hash::{Hashable, ObjectHash};

use crate::output::{OutputFormat, print_failure, print_json, print_stat, print_success, print_warning, symbols};

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ToolchainStatus {
  Resolved(ResolvedToolchain),
  Unavailable { message: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ConfigStatus {
  /// Set and parseable; `target` is the redacted descriptor.
  Set { target: String },
  Missing,
  Invalid { message: String },
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
  recipe: &'a str,
  recipe_hash: ObjectHash,
  path: &'a Path,
  toolchain: ToolchainStatus,
  args: &'a [String],
  config_var: &'a str,
  config: ConfigStatus,
  artifact: &'a ArtifactDef,
  runtime: &'a RuntimeDef,
}

pub fn cmd_plan(recipe: &Path, output: OutputFormat) -> Result<()> {
  let loaded = load_recipe(recipe)
    .map_err(PipelineError::from)
    .with_context(|| format!("Failed to load recipe: {}", recipe.display()))?;
  let recipe_hash = loaded.recipe.compute_hash().context("Failed to compute recipe hash")?;

  let probe_dir = tempfile::TempDir::new().context("Failed to create probe directory")?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let toolchain = match rt.block_on(resolve_toolchain(&loaded.build.toolchain, &loaded.dir, probe_dir.path())) {
    Ok(resolved) => ToolchainStatus::Resolved(resolved),
    Err(e) => ToolchainStatus::Unavailable { message: e.to_string() },
  };

  let config = match BuildSecret::from_env(&loaded.build.config_var) {
    Ok(secret) => ConfigStatus::Set {
      target: secret.descriptor().redacted(),
    },
    Err(SecretError::Missing { .. }) => ConfigStatus::Missing,
    Err(e) => ConfigStatus::Invalid { message: e.to_string() },
  };

  let report = PlanReport {
    recipe: &loaded.name,
    recipe_hash,
    path: &loaded.path,
    toolchain,
    args: &loaded.build.args,
    config_var: &loaded.build.config_var,
    config,
    artifact: &loaded.artifact,
    runtime: &loaded.runtime,
  };

  if output.is_json() {
    return print_json(&report);
  }

  println!("Plan: {} ({})", report.recipe, report.recipe_hash);
  println!("Recipe: {}", report.path.display());

  println!();
  println!("Build stage:");
  match &report.toolchain {
    ToolchainStatus::Resolved(resolved) => {
      print_success(&format!("Toolchain {} at {}", resolved.version, resolved.program.display()))
    }
    ToolchainStatus::Unavailable { message } => print_failure(&format!("Toolchain: {}", message)),
  }
  print_stat(
    "Command",
    &format!("{} {}", loaded.build.toolchain.program, report.args.join(" ")),
  );
  match &report.config {
    ConfigStatus::Set { target } => print_success(&format!("{} is set ({})", report.config_var, target)),
    ConfigStatus::Missing => print_warning(&format!(
      "{} is not set; a live build will fail (use --schema-fixture to build offline)",
      report.config_var
    )),
    ConfigStatus::Invalid { message } => print_failure(message),
  }

  println!();
  println!("Runtime image:");
  print_stat(
    "Artifact",
    &format!(
      "{} {} {}",
      report.artifact.path,
      symbols::ARROW,
      report.runtime.install_path
    ),
  );
  let base = match &report.runtime.base {
    Some(base) => format!("{} (pinned)", base.path),
    None => "scratch".to_string(),
  };
  print_stat("Base", &base);
  if !report.runtime.expose.is_empty() {
    let ports: Vec<String> = report.runtime.expose.iter().map(u16::to_string).collect();
    print_stat("Expose", &ports.join(", "));
  }

  Ok(())
}
