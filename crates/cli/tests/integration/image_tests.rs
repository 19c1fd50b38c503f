use predicates::prelude::*;

use super::common::TestEnv;

fn built() -> TestEnv {
  let env = TestEnv::project();
  env.fixture_build_cmd().assert().success();
  env
}

#[test]
fn inspect_shows_manifest() {
  let env = built();

  env
    .stagehand_cmd()
    .arg("inspect")
    .arg(env.image_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Image: users-service"))
    .stdout(predicate::str::contains("Entrypoint: /usr/local/bin/app"))
    .stdout(predicate::str::contains("Base: scratch"))
    .stdout(predicate::str::contains("8080"));
}

#[test]
fn inspect_json_output_is_valid() {
  let env = built();

  let output = env
    .stagehand_cmd()
    .arg("inspect")
    .arg(env.image_path())
    .args(["-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(manifest["artifact"]["path"], "/usr/local/bin/app");
  assert_eq!(manifest["base"]["kind"], "scratch");
}

#[test]
fn verify_accepts_built_image() {
  let env = built();

  env
    .stagehand_cmd()
    .arg("verify")
    .arg(env.image_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Image verified"));
}

#[test]
fn verify_rejects_tampered_artifact() {
  let env = built();
  std::fs::write(env.image_path().join("rootfs/usr/local/bin/app"), "tampered").unwrap();

  env
    .stagehand_cmd()
    .arg("verify")
    .arg(env.image_path())
    .assert()
    .code(70);
}

#[test]
fn verify_rejects_extra_files() {
  let env = built();
  std::fs::write(env.image_path().join("Cargo.toml"), "[package]\n").unwrap();

  env
    .stagehand_cmd()
    .arg("verify")
    .arg(env.image_path())
    .assert()
    .code(70)
    .stderr(predicate::str::contains("unexpected entry"));
}

#[test]
fn inspect_missing_image_fails() {
  let env = TestEnv::empty();

  env
    .stagehand_cmd()
    .args(["inspect", "no-such-image"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("image.json"));
}
