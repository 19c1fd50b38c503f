use std::path::Path;

use anyhow::{Context, Result};

use stagehand_lib::image::verify_image;
use stagehand_lib::pipeline::PipelineError;

use crate::output::{print_stat, print_success, short_digest};

pub fn cmd_verify(image: &Path) -> Result<()> {
  let verified = verify_image(image)
    .map_err(PipelineError::from)
    .with_context(|| format!("Image failed verification: {}", image.display()))?;

  print_success(&format!("Image verified: {}", image.display()));
  print_stat("Artifact", &verified.manifest.artifact.path);
  print_stat("SHA-256", short_digest(&verified.manifest.artifact.sha256.0));

  Ok(())
}
