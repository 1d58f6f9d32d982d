//! Targets command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn targets_lists_standard_routes() {
  let env = TestEnv::from_fixture("demo.yml");

  env
    .spec_cmd("targets")
    .assert()
    .success()
    .stdout(predicate::str::contains("rpm/buildroot"))
    .stdout(predicate::str::contains("deb/debroot"))
    .stdout(predicate::str::contains("debug/resolve"))
    .stdout(predicate::str::contains("Outputs an rpm buildroot suitable for passing to rpmbuild"));
}

#[test]
fn targets_json_marks_single_default() {
  let env = TestEnv::from_fixture("forward.yml");

  let assert = env.spec_cmd("targets").args(["-o", "json"]).assert().success();
  let targets: Vec<serde_json::Value> = serde_json::from_slice(&assert.get_output().stdout).unwrap();

  let names: Vec<&str> = targets.iter().map(|t| t["name"].as_str().unwrap()).collect();
  assert_eq!(
    names,
    vec!["buildroot", "rpm/buildroot", "deb/debroot", "debug/resolve", "external"]
  );

  let defaults: Vec<&str> = targets
    .iter()
    .filter(|t| t["default"].as_bool() == Some(true))
    .map(|t| t["name"].as_str().unwrap())
    .collect();
  assert_eq!(defaults, vec!["buildroot"]);
}

#[test]
fn targets_needs_required_args() {
  let env = TestEnv::from_fixture("args.yml");

  env.spec_cmd("targets").assert().failure().code(137);
  env
    .spec_cmd("targets")
    .args(["--build-arg", "COMMIT=abc", "--platform", "linux/amd64"])
    .assert()
    .success();
}

#[test]
fn targets_rejects_invalid_spec() {
  let env = TestEnv::empty();
  env.write_file("Dockerfile", "version: 1.0.0\nsources: {}\n");

  env
    .spec_cmd("targets")
    .assert()
    .failure()
    .code(137)
    .stderr(predicate::str::contains("name"));
}
