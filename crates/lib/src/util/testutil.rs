//! Test utilities for stagehand-lib.
//!
//! Provides a sample recipe, a fake toolchain standing in for a compiler with
//! live query checking, and a throwaway project laid out the way the pipeline
//! expects.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::context::BuildContext;
use crate::recipe::{ArtifactDef, BuildDef, LoadedRecipe, Recipe, RuntimeDef, ToolchainDef};

/// The recipe most tests start from.
pub fn sample_recipe() -> Recipe {
  Recipe {
    name: "users-service".to_string(),
    build: BuildDef {
      toolchain: ToolchainDef {
        program: "cargo".to_string(),
        version: "1.80.0".to_string(),
        path: vec![],
        version_args: vec!["--version".to_string()],
      },
      args: vec!["build".to_string(), "--release".to_string()],
      config_var: "DATABASE_URL".to_string(),
      env: BTreeMap::new(),
      pass_env: vec!["CARGO_HOME".to_string()],
      exclude: vec!["target".to_string(), ".git".to_string()],
      validation_markers: vec!["error returned from database".to_string()],
      fixture_env: BTreeMap::from([("SQLX_OFFLINE".to_string(), "true".to_string())]),
      timeout_secs: None,
      probe_timeout_ms: 5_000,
    },
    artifact: ArtifactDef {
      name: "app".to_string(),
      path: "target/release/app".to_string(),
    },
    runtime: RuntimeDef {
      base: None,
      install_path: "/usr/local/bin/app".to_string(),
      env: BTreeMap::new(),
      workdir: "/".to_string(),
      expose: vec![8080],
      user: None,
    },
  }
}

/// A fake `cargo` that behaves like a compiler checking queries against a database.
///
/// Marker files in the build context select failure modes:
/// `schema_mismatch`, `compile_error`, `no_artifact`, and `leak` (embeds the
/// descriptor in the binary). Only shell builtins and absolute paths are used
/// because the build environment's `PATH` is the toolchain directory alone.
pub const FAKE_TOOLCHAIN: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "cargo 1.80.0 (stagehand-test)"
  exit 0
fi
echo "   Compiling app v0.1.0" >&2
if [ -n "$DATABASE_URL" ]; then
  echo "    Checking queries against $DATABASE_URL" >&2
elif [ -z "$SQLX_OFFLINE" ]; then
  echo "error: set DATABASE_URL to use query macros online" >&2
  exit 101
fi
if [ -e schema_mismatch ]; then
  echo "error: error returned from database: column \"emali\" does not exist" >&2
  exit 101
fi
if [ -e compile_error ]; then
  echo "error[E0308]: mismatched types" >&2
  exit 101
fi
if [ -e no_artifact ]; then
  exit 0
fi
/bin/mkdir -p target/release
if [ -e leak ]; then
  printf '\177ELF app %s\n' "$DATABASE_URL" > target/release/app
else
  printf '\177ELF app stagehand-test-binary\n' > target/release/app
fi
echo "    Finished release [optimized] target(s)" >&2
"#;

/// Write [`FAKE_TOOLCHAIN`] as `<dir>/cargo`.
#[cfg(unix)]
pub fn write_fake_toolchain(dir: &Path) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  fs::create_dir_all(dir).unwrap();
  let path = dir.join("cargo");
  fs::write(&path, FAKE_TOOLCHAIN).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// A listening socket standing in for the database, plus a descriptor for it.
///
/// The listener must stay alive for as long as the descriptor is probed.
pub async fn reachable_database(password: &str) -> (tokio::net::TcpListener, String) {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  let url = format!("postgres://app:{}@127.0.0.1:{}/users", password, port);
  (listener, url)
}

/// A temporary project: source tree, fake toolchain and private store.
pub struct TestProject {
  pub temp: TempDir,
  /// Source tree and recipe directory.
  pub root: PathBuf,
  pub store: PathBuf,
  pub recipe: LoadedRecipe,
}

impl TestProject {
  #[cfg(unix)]
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let base = dunce::canonicalize(temp.path()).unwrap();
    let root = base.join("project");
    let toolchain = base.join("toolchain");
    let store = base.join("store");

    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("Cargo.toml"), "[package]\nname = \"app\"\nversion = \"0.1.0\"\n").unwrap();
    fs::write(
      root.join("src/main.rs"),
      "fn main() { let _ = sqlx::query!(\"SELECT email FROM users\"); }\n",
    )
    .unwrap();
    write_fake_toolchain(&toolchain);

    let mut recipe = sample_recipe();
    recipe.build.toolchain.path = vec![toolchain.to_string_lossy().into_owned()];
    recipe.build.pass_env.clear();

    let recipe = LoadedRecipe {
      recipe,
      path: root.join("stage.lua"),
      dir: root.clone(),
    };

    Self {
      temp,
      root,
      store,
      recipe,
    }
  }

  pub fn write_source(&self, relative: &str, content: &str) {
    let path = self.root.join(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }

  pub fn context(&self) -> BuildContext {
    BuildContext::snapshot(&self.root, &self.recipe.build.exclude).unwrap()
  }
}
