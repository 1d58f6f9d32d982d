//! Tar command integration tests.

use super::common::{MAIN_C, TestEnv, unpack};

#[test]
fn tar_archives_directory() {
  let env = TestEnv::empty();
  env.write_file("src/main.c", MAIN_C);
  env.write_file("src/include/lib.h", "#pragma once\n");
  let dst = env.temp.path().join("out/src.tar.gz");

  env
    .pkgraph_cmd()
    .arg("tar")
    .arg(env.temp.path().join("src"))
    .arg(&dst)
    .assert()
    .success();

  let files = unpack(&dst);
  assert_eq!(files.keys().collect::<Vec<_>>(), vec!["include/lib.h", "main.c"]);
}

#[test]
fn tar_is_reproducible() {
  let env = TestEnv::empty();
  env.write_file("src/main.c", MAIN_C);
  let first = env.temp.path().join("first.tar.gz");
  let second = env.temp.path().join("second.tar.gz");

  for dst in [&first, &second] {
    env
      .pkgraph_cmd()
      .arg("tar")
      .arg(env.temp.path().join("src"))
      .arg(dst)
      .assert()
      .success();
    // Rewriting the file changes its mtime; the archive must not.
    env.write_file("src/main.c", MAIN_C);
  }

  assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[test]
fn tar_missing_source_fails() {
  let env = TestEnv::empty();

  env
    .pkgraph_cmd()
    .arg("tar")
    .arg(env.temp.path().join("missing"))
    .arg(env.temp.path().join("out.tar.gz"))
    .assert()
    .failure()
    .code(137);
}
