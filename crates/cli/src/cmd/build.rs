//! Implementation of the `stagehand build` command.
//!
//! Loads the recipe, runs the build stage and the image assembler, and prints
//! what ended up in the image.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use stagehand_lib::pipeline::{PipelineError, PipelineOptions, run_pipeline};
use stagehand_lib::recipe::load_recipe;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_json, print_stat, print_success, symbols, short_digest,
};

pub fn cmd_build(recipe: &Path, options: PipelineOptions, timeout: Option<Duration>, output: OutputFormat) -> Result<()> {
  let mut loaded = load_recipe(recipe)
    .map_err(PipelineError::from)
    .with_context(|| format!("Failed to load recipe: {}", recipe.display()))?;
  if let Some(timeout) = timeout {
    debug!(timeout = %humantime::format_duration(timeout), "overriding compiler timeout");
    loaded.recipe.build.timeout_secs = Some(timeout_secs(timeout));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(run_pipeline(&loaded, &options))
    .with_context(|| format!("Build of '{}' failed", loaded.name))?;

  if output.is_json() {
    return print_json(&report);
  }

  println!();
  print_success(&format!("Image ready: {}", report.image.display()));
  print_stat("Recipe", &format!("{} ({})", report.recipe, report.recipe_hash));
  print_stat("Validated against", report.oracle);
  print_stat("Toolchain", &report.toolchain.reported);
  print_stat(
    "Context",
    &format!("{} files ({})", report.context_files, short_digest(&report.context_hash.0)),
  );
  print_stat(
    "Artifact",
    &format!(
      "{} {} {} ({}, {})",
      report.artifact.name,
      symbols::ARROW,
      report.image_manifest.artifact.path,
      format_bytes(report.artifact.size),
      short_digest(&report.artifact.sha256.0)
    ),
  );
  print_stat("Entrypoint", &report.image_manifest.entrypoint.join(" "));
  print_stat("Duration", &format_duration(report.duration));

  Ok(())
}

/// Whole seconds for the recipe's timeout, rounded up so the compiler never
/// gets less time than asked for.
fn timeout_secs(timeout: Duration) -> u64 {
  let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
  secs.max(1)
}
