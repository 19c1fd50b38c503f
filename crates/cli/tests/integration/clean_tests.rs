use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn clean_with_no_store_succeeds() {
  let env = TestEnv::empty();

  env
    .stagehand_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Store cleaned"));
}

#[test]
fn clean_removes_abandoned_workspaces() {
  let env = TestEnv::empty();
  env.write_file("store/work/run-abandoned/src/main.rs", "fn main() {}\n");

  env
    .stagehand_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Workspaces removed: 1"));

  assert!(!env.store_path().join("work/run-abandoned").exists());
}

#[test]
fn clean_dry_run_keeps_everything() {
  let env = TestEnv::empty();
  env.write_file("store/work/run-abandoned/src/main.rs", "fn main() {}\n");
  env.write_file("store/artifacts/0123456789abcdef0123/app", "binary");

  env
    .stagehand_cmd()
    .args(["clean", "--artifacts", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"));

  assert!(env.store_path().join("work/run-abandoned").exists());
  assert!(env.store_path().join("artifacts/0123456789abcdef0123").exists());
}

#[test]
fn clean_artifacts_removes_promoted_artifacts() {
  let env = TestEnv::empty();
  env.write_file("store/artifacts/0123456789abcdef0123/app", "binary");

  env
    .stagehand_cmd()
    .args(["clean", "--artifacts"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Artifacts removed: 1"));

  assert!(!env.store_path().join("artifacts/0123456789abcdef0123").exists());
}

#[test]
fn clean_json_output_is_valid() {
  let env = TestEnv::empty();

  env
    .stagehand_cmd()
    .args(["clean", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("workspaces_removed"))
    .stdout(predicate::str::contains("artifacts_removed"));
}
