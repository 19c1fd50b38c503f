use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use stagehand_lib::artifact::ArtifactStore;
use stagehand_lib::build::workspace::sweep_workspaces;
use stagehand_lib::pipeline::PipelineError;
use stagehand_lib::platform::paths::work_dir;
use stagehand_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

#[derive(Debug, Serialize)]
struct CleanResult {
  dry_run: bool,
  workspaces_removed: Vec<PathBuf>,
  artifacts_removed: Vec<PathBuf>,
}

pub fn cmd_clean(artifacts: bool, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let _lock = StoreLock::acquire(LockMode::Exclusive, "clean")
    .map_err(PipelineError::from)
    .context("Failed to acquire store lock")?;

  let workspaces_removed = sweep_workspaces(&work_dir(), dry_run).context("Failed to remove stale workspaces")?;
  let artifacts_removed = if artifacts {
    ArtifactStore::default()
      .clear(dry_run)
      .context("Failed to remove promoted artifacts")?
  } else {
    Vec::new()
  };

  let result = CleanResult {
    dry_run,
    workspaces_removed,
    artifacts_removed,
  };

  if output.is_json() {
    print_json(&result)?;
  } else {
    println!();
    if dry_run {
      print_info("Dry run - no changes made");
    } else {
      print_success("Store cleaned!");
    }
    print_stat("Workspaces removed", &result.workspaces_removed.len().to_string());
    if artifacts {
      print_stat("Artifacts removed", &result.artifacts_removed.len().to_string());
    }
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
