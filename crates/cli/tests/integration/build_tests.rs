use predicates::prelude::*;

use super::common::{TestEnv, reachable_database, unreachable_database};

const PASSWORD: &str = "correcthorsebattery";

#[test]
fn live_build_produces_image() {
  let env = TestEnv::project();
  let (_db, url) = reachable_database(PASSWORD);

  env
    .build_cmd()
    .env("DATABASE_URL", &url)
    .assert()
    .success()
    .stdout(predicate::str::contains("Image ready"))
    .stdout(predicate::str::contains("/usr/local/bin/app"))
    .stdout(predicate::str::contains("live"));

  let image = env.image_path();
  assert!(image.join("image.json").is_file());
  assert!(image.join("rootfs/usr/local/bin/app").is_file());
}

#[test]
fn live_build_never_prints_the_descriptor() {
  let env = TestEnv::project();
  let (_db, url) = reachable_database(PASSWORD);

  env
    .build_cmd()
    .arg("-vv")
    .env("DATABASE_URL", &url)
    .assert()
    .success()
    .stdout(predicate::str::contains(PASSWORD).not())
    .stderr(predicate::str::contains(PASSWORD).not());

  let manifest = std::fs::read_to_string(env.image_path().join("image.json")).unwrap();
  assert!(!manifest.contains(PASSWORD));
}

#[test]
fn missing_descriptor_is_a_configuration_error() {
  let env = TestEnv::project();

  env
    .build_cmd()
    .assert()
    .code(78)
    .stderr(predicate::str::contains("DATABASE_URL is not set"));

  assert!(!env.image_path().exists());
}

#[test]
fn malformed_descriptor_is_a_configuration_error() {
  let env = TestEnv::project();

  env.build_cmd().env("DATABASE_URL", "   ").assert().code(78);
}

#[test]
fn unreachable_database_fails_before_compiling() {
  let env = TestEnv::project();

  env
    .build_cmd()
    .env("DATABASE_URL", unreachable_database())
    .assert()
    .code(68)
    .stderr(predicate::str::contains("pw@").not());

  assert!(!env.image_path().exists());
}

#[test]
fn schema_mismatch_propagates_compiler_exit_code() {
  let env = TestEnv::project();
  env.write_file("project/schema_mismatch", "");
  let (_db, url) = reachable_database(PASSWORD);

  env
    .build_cmd()
    .env("DATABASE_URL", &url)
    .assert()
    .code(101)
    .stderr(predicate::str::contains("column \"emali\" does not exist"))
    .stderr(predicate::str::contains(PASSWORD).not());

  assert!(!env.image_path().exists());
}

#[test]
fn compile_error_propagates_compiler_exit_code() {
  let env = TestEnv::project();
  env.write_file("project/compile_error", "");

  env
    .fixture_build_cmd()
    .assert()
    .code(101)
    .stderr(predicate::str::contains("error[E0308]: mismatched types"));
}

#[test]
fn leaking_artifact_is_rejected() {
  let env = TestEnv::project();
  env.write_file("project/leak", "");
  let (_db, url) = reachable_database(PASSWORD);

  env
    .build_cmd()
    .env("DATABASE_URL", &url)
    .assert()
    .code(70)
    .stderr(predicate::str::contains(PASSWORD).not());

  assert!(!env.image_path().exists());
}

#[test]
fn fixture_build_needs_no_descriptor() {
  let env = TestEnv::project();

  env
    .fixture_build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("fixture"));

  assert!(env.image_path().join("image.json").is_file());
}

#[test]
fn existing_image_requires_force() {
  let env = TestEnv::project();
  env.fixture_build_cmd().assert().success();

  env
    .fixture_build_cmd()
    .assert()
    .code(78)
    .stderr(predicate::str::contains("--force"));

  env.fixture_build_cmd().arg("--force").assert().success();
}

#[test]
fn build_json_output_is_valid() {
  let env = TestEnv::project();

  let output = env.fixture_build_cmd().args(["-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["recipe"], "users-service");
  assert_eq!(report["oracle"], "fixture");
  assert_eq!(report["image_manifest"]["entrypoint"][0], "/usr/local/bin/app");
  assert_eq!(
    report["artifact"]["sha256"],
    report["image_manifest"]["artifact"]["sha256"]
  );
}

#[test]
fn missing_recipe_is_a_configuration_error() {
  let env = TestEnv::empty();

  env
    .stagehand_cmd()
    .args(["build", "nope.lua"])
    .assert()
    .code(78)
    .stderr(predicate::str::contains("recipe not found"));
}

#[test]
fn no_workspace_survives_a_failed_build() {
  let env = TestEnv::project();
  env.write_file("project/compile_error", "");

  env.fixture_build_cmd().assert().failure();

  let work = env.store_path().join("work");
  let leftover = std::fs::read_dir(&work).map(|entries| entries.count()).unwrap_or(0);
  assert_eq!(leftover, 0);
}
