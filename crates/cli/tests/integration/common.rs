//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Stands in for `cargo` with live query checking.
///
/// Marker files in the source tree select failure modes: `schema_mismatch`,
/// `compile_error` and `leak`.
const FAKE_TOOLCHAIN: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "cargo 1.80.0 (stagehand-test)"
  exit 0
fi
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
/bin/mkdir -p target/release
if [ -e leak ]; then
  printf '\177ELF app %s\n' "$DATABASE_URL" > target/release/app
else
  printf '\177ELF app stagehand-test-binary\n' > target/release/app
fi
"#;

const RECIPE: &str = r#"
return {
  name = "users-service",
  build = {
    toolchain = { program = "cargo", version = "1.80.0", path = { "../toolchain" } },
    args = { "build", "--release" },
    config_var = "DATABASE_URL",
    validation_markers = { "error returned from database" },
    fixture_env = { SQLX_OFFLINE = "true" },
  },
  artifact = { name = "app", path = "target/release/app" },
  runtime = { install_path = "/usr/local/bin/app", expose = { 8080 } },
}
"#;

/// Isolated test environment.
///
/// ```text
/// <temp>/
/// ├── project/     # stage.lua + source tree
/// ├── toolchain/   # fake cargo
/// ├── fixture/     # schema fixture
/// └── store/       # STAGEHAND_STORE
/// ```
///
/// Commands run from `<temp>`, so the default `--out image` lands there.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A project with a recipe, a small source tree and a fake toolchain.
  #[cfg(unix)]
  pub fn project() -> Self {
    use std::os::unix::fs::PermissionsExt;

    let env = Self::empty();
    env.write_file("project/stage.lua", RECIPE);
    env.write_file("project/Cargo.toml", "[package]\nname = \"app\"\nversion = \"0.1.0\"\n");
    env.write_file(
      "project/src/main.rs",
      "fn main() { let _ = sqlx::query!(\"SELECT email FROM users\"); }\n",
    );
    env.write_file("toolchain/cargo", FAKE_TOOLCHAIN);
    std::fs::set_permissions(
      env.root().join("toolchain/cargo"),
      std::fs::Permissions::from_mode(0o755),
    )
    .unwrap();
    std::fs::create_dir_all(env.root().join("fixture")).unwrap();
    env
  }

  /// Create an empty test environment.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    Self { temp }
  }

  /// Canonical temp root.
  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn recipe_path(&self) -> PathBuf {
    self.root().join("project/stage.lua")
  }

  pub fn fixture_path(&self) -> PathBuf {
    self.root().join("fixture")
  }

  pub fn image_path(&self) -> PathBuf {
    self.root().join("image")
  }

  pub fn store_path(&self) -> PathBuf {
    self.root().join("store")
  }

  /// Get a pre-configured Command for the stagehand binary.
  ///
  /// Runs in the temp root with an isolated store and without any
  /// `DATABASE_URL` inherited from the test process.
  pub fn stagehand_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("stagehand");
    cmd.current_dir(self.root());
    cmd.env("STAGEHAND_STORE", self.store_path());
    cmd.env_remove("DATABASE_URL");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `stagehand build` with the project's recipe.
  pub fn build_cmd(&self) -> Command {
    let mut cmd = self.stagehand_cmd();
    cmd.arg("build").arg(self.recipe_path());
    cmd
  }

  /// `stagehand build` validating against the schema fixture.
  pub fn fixture_build_cmd(&self) -> Command {
    let mut cmd = self.build_cmd();
    cmd.arg("--schema-fixture").arg(self.fixture_path());
    cmd
  }
}

/// A listening socket standing in for the database, plus a descriptor for it.
pub fn reachable_database(password: &str) -> (std::net::TcpListener, String) {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let port = listener.local_addr().unwrap().port();
  let url = format!("postgres://app:{}@127.0.0.1:{}/users", password, port);
  (listener, url)
}

/// A descriptor for a port nothing listens on.
pub fn unreachable_database() -> String {
  let port = {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
  };
  format!("postgres://app:pw@127.0.0.1:{}/users", port)
}
