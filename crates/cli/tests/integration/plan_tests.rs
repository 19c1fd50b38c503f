use predicates::prelude::*;

use super::common::{TestEnv, reachable_database};

#[test]
fn plan_reports_toolchain_and_missing_variable() {
  let env = TestEnv::project();

  env
    .stagehand_cmd()
    .arg("plan")
    .arg(env.recipe_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Plan: users-service"))
    .stdout(predicate::str::contains("Toolchain 1.80.0"))
    .stderr(predicate::str::contains("DATABASE_URL is not set"));
}

#[test]
fn plan_never_prints_the_value() {
  let env = TestEnv::project();
  let (_db, url) = reachable_database("correcthorsebattery");

  env
    .stagehand_cmd()
    .arg("plan")
    .arg(env.recipe_path())
    .env("DATABASE_URL", &url)
    .assert()
    .success()
    .stdout(predicate::str::contains("DATABASE_URL is set"))
    .stdout(predicate::str::contains("correcthorsebattery").not());
}

#[test]
fn plan_json_output_is_valid() {
  let env = TestEnv::project();

  let output = env
    .stagehand_cmd()
    .arg("plan")
    .arg(env.recipe_path())
    .args(["-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plan["recipe"], "users-service");
  assert_eq!(plan["toolchain"]["status"], "resolved");
  assert_eq!(plan["config"]["status"], "missing");
  assert_eq!(plan["runtime"]["install_path"], "/usr/local/bin/app");
}

#[test]
fn plan_reports_unavailable_toolchain() {
  let env = TestEnv::project();
  std::fs::remove_file(env.root().join("toolchain/cargo")).unwrap();

  env
    .stagehand_cmd()
    .arg("plan")
    .arg(env.recipe_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Toolchain:"));
}

#[test]
fn plan_rejects_recipe_reading_environment() {
  let env = TestEnv::empty();
  env.write_file("stage.lua", "return { name = os.getenv(\"DATABASE_URL\") }\n");

  env.stagehand_cmd().arg("plan").assert().code(78);
}
