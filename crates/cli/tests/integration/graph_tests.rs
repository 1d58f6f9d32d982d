//! Graph command integration tests.

use super::common::TestEnv;

fn graph(env: &TestEnv, extra: &[&str]) -> serde_json::Value {
  let assert = env
    .spec_cmd("graph")
    .args(["--platform", "linux/amd64"])
    .args(extra)
    .assert()
    .success();
  serde_json::from_slice(&assert.get_output().stdout).unwrap()
}

fn count_ops(def: &serde_json::Value, kind: &str) -> usize {
  def["nodes"]
    .as_array()
    .unwrap()
    .iter()
    .filter(|node| node["op"].get(kind).is_some())
    .count()
}

#[test]
fn graph_is_deterministic() {
  let env = TestEnv::from_fixture("demo.yml");
  assert_eq!(graph(&env, &[]), graph(&env, &[]));
}

#[test]
fn graph_uses_merge_and_diff_by_default() {
  let env = TestEnv::from_fixture("demo.yml");
  let def = graph(&env, &[]);

  assert_eq!(count_ops(&def, "diff"), 2);
  assert_eq!(count_ops(&def, "merge"), 1);
  assert_eq!(count_ops(&def, "exec"), 1);
  assert!(def["root"]["digest"].as_str().unwrap().starts_with("sha256:"));
}

#[test]
fn graph_without_merge_copies_in_place() {
  let env = TestEnv::from_fixture("demo.yml");
  let def = graph(&env, &["--no-merge"]);

  assert_eq!(count_ops(&def, "diff"), 0);
  assert_eq!(count_ops(&def, "merge"), 0);
}

#[test]
fn graph_embeds_self_exe_override() {
  let env = TestEnv::from_fixture("demo.yml");
  let assert = env
    .spec_cmd("graph")
    .args(["--platform", "linux/amd64"])
    .env("PKGRAPH_SELF_EXE", "/usr/bin/pkgraph")
    .assert()
    .success();
  let def: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

  let exec = def["nodes"]
    .as_array()
    .unwrap()
    .iter()
    .find_map(|node| node["op"].get("exec"))
    .unwrap();
  assert_eq!(
    exec["args"],
    serde_json::json!(["/usr/bin/pkgraph", "tar", "/tmp/src/st", "/tmp/src/stOut/src.tar.gz"])
  );
}

#[test]
fn graph_reports_forwarding() {
  let env = TestEnv::from_fixture("forward.yml");
  let out = graph(&env, &["--target", "external/image"]);
  assert_eq!(out["forward"]["frontend"], "ghcr.io/org/frontend:latest");
  assert_eq!(out["forward"]["target"], "image");
}
