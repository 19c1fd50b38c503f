use std::path::Path;

use anyhow::{Context, Result};

use stagehand_lib::image::{BaseImage, load_image};
use stagehand_lib::pipeline::PipelineError;

use crate::output::{OutputFormat, format_bytes, print_json, print_stat, short_digest};

pub fn cmd_inspect(image: &Path, output: OutputFormat) -> Result<()> {
  let image = load_image(image)
    .map_err(PipelineError::from)
    .with_context(|| format!("Failed to load image: {}", image.display()))?;
  let manifest = &image.manifest;

  if output.is_json() {
    return print_json(manifest);
  }

  println!("Image: {}", manifest.name);
  print_stat("Platform", &manifest.platform.triple());
  let base = match &manifest.base {
    BaseImage::Scratch => "scratch".to_string(),
    BaseImage::Pinned { digest } => format!("pinned ({})", short_digest(digest)),
  };
  print_stat("Base", &base);
  print_stat(
    "Artifact",
    &format!(
      "{} ({}, {})",
      manifest.artifact.path,
      format_bytes(manifest.artifact.size),
      short_digest(&manifest.artifact.sha256.0)
    ),
  );
  print_stat("Entrypoint", &manifest.entrypoint.join(" "));
  print_stat("Workdir", &manifest.workdir);
  if let Some(user) = &manifest.user {
    print_stat("User", user);
  }
  if !manifest.expose.is_empty() {
    let ports: Vec<String> = manifest.expose.iter().map(u16::to_string).collect();
    print_stat("Expose", &ports.join(", "));
  }
  for (key, value) in &manifest.env {
    print_stat("Env", &format!("{}={}", key, value));
  }
  print_stat("Rootfs", short_digest(&manifest.rootfs_digest.0));

  Ok(())
}
