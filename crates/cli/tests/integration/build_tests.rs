//! Build command integration tests.

use predicates::prelude::*;

use super::common::{MAIN_C, TestEnv, list_files, unpack};

#[test]
fn build_writes_packager_tree() {
  let env = TestEnv::from_fixture("demo.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--output"])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Built default target for 1 platform(s)"));

  assert_eq!(
    list_files(&out),
    vec!["SOURCES/notes", "SOURCES/src.tar.gz", "SPECS/demo.spec"]
  );
  assert_eq!(std::fs::read_to_string(out.join("SOURCES/notes")).unwrap(), "hello");

  let archive = unpack(&out.join("SOURCES/src.tar.gz"));
  assert_eq!(archive.get("main.c").map(Vec::as_slice), Some(MAIN_C.as_bytes()));

  let spec = std::fs::read_to_string(out.join("SPECS/demo.spec")).unwrap();
  assert!(spec.contains("Name: demo"));
  assert!(spec.contains("BuildRequires: gcc"));
}

#[test]
fn build_strategies_produce_the_same_tree() {
  let env = TestEnv::from_fixture("demo.yml");
  let merged = env.temp.path().join("merged");
  let in_place = env.temp.path().join("in-place");

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--output"])
    .arg(&merged)
    .assert()
    .success();
  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--no-merge", "--output"])
    .arg(&in_place)
    .assert()
    .success();

  assert_eq!(list_files(&merged), list_files(&in_place));
  for file in list_files(&merged) {
    assert_eq!(
      std::fs::read(merged.join(&file)).unwrap(),
      std::fs::read(in_place.join(&file)).unwrap(),
      "{file} differs"
    );
  }
}

#[test]
fn build_with_inline_materializer() {
  let env = TestEnv::from_fixture("demo.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--materializer", "inline", "--output"])
    .arg(&out)
    .assert()
    .success();

  let archive = unpack(&out.join("SOURCES/src.tar.gz"));
  assert_eq!(archive.get("main.c").map(Vec::as_slice), Some(MAIN_C.as_bytes()));
}

#[test]
fn build_every_platform_into_its_own_dir() {
  let env = TestEnv::from_fixture("demo.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--platform", "linux/arm64", "--output"])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("for 2 platform(s)"));

  assert!(out.join("linux_amd64/SPECS/demo.spec").is_file());
  assert!(out.join("linux_arm64/SPECS/demo.spec").is_file());
}

#[test]
fn build_json_output_lists_results() {
  let env = TestEnv::from_fixture("demo.yml");

  let assert = env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "-o", "json"])
    .assert()
    .success();

  let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
  let result = json["results"]["linux/amd64"].as_str().unwrap();
  assert!(result.starts_with("sha256:"));
}

#[test]
fn build_bare_buildroot_target() {
  let env = TestEnv::from_fixture("demo.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--target", "buildroot", "--output"])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Built buildroot for 1 platform(s)"));

  assert!(out.join("SPECS/demo.spec").is_file());
}

#[test]
fn build_deb_target() {
  let env = TestEnv::from_fixture("demo.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--target", "deb", "--output"])
    .arg(&out)
    .assert()
    .success();

  assert!(out.join("SPECS/demo.control").is_file());
}

#[test]
fn build_debug_resolve_substitutes_args() {
  let env = TestEnv::from_fixture("args.yml");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args([
      "--platform",
      "linux/arm64",
      "--target",
      "debug/resolve",
      "--build-arg",
      "COMMIT=abc123",
      "--output",
    ])
    .arg(&out)
    .assert()
    .success();

  let resolved = std::fs::read_to_string(out.join("spec.yml")).unwrap();
  assert!(resolved.contains("1.0.0"));
  assert!(!resolved.contains("${"));
  assert!(resolved.contains("built from abc123 for arm64"));
}

#[test]
fn build_missing_build_arg_fails() {
  let env = TestEnv::from_fixture("args.yml");

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64"])
    .assert()
    .failure()
    .code(137)
    .stderr(predicate::str::contains("COMMIT"));
}

#[test]
fn build_unknown_target_fails() {
  let env = TestEnv::from_fixture("demo.yml");

  env
    .spec_cmd("build")
    .args(["--target", "rpm/nope"])
    .assert()
    .failure()
    .code(137)
    .stderr(predicate::str::contains("unknown target"));
}

#[test]
fn build_unsupported_source_kind_fails() {
  let env = TestEnv::from_fixture("invalid_source.yml");

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64"])
    .assert()
    .failure()
    .code(137)
    .stderr(predicate::str::contains("build"));
}

#[test]
fn build_forwarded_target_is_unsupported_locally() {
  let env = TestEnv::from_fixture("forward.yml");

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--target", "external"])
    .assert()
    .failure()
    .code(137)
    .stderr(predicate::str::contains("ghcr.io/org/frontend:latest"));
}

#[test]
fn build_with_separate_context() {
  let env = TestEnv::from_fixture("demo.yml");
  env.write_file("other/src/main.c", "// other\n");
  let out = env.output_path();

  env
    .spec_cmd("build")
    .args(["--platform", "linux/amd64", "--context"])
    .arg(env.temp.path().join("other"))
    .arg("--output")
    .arg(&out)
    .assert()
    .success();

  let archive = unpack(&out.join("SOURCES/src.tar.gz"));
  assert_eq!(archive.get("main.c").map(Vec::as_slice), Some(&b"// other\n"[..]));
}
