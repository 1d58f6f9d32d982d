//! Shared test helpers for CLI integration tests.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::read::GzDecoder;
use tempfile::TempDir;

pub const MAIN_C: &str = "int main(void) { return 0; }\n";

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary build context holding the spec as
/// `Dockerfile` and a small `src/` tree.
pub struct TestEnv {
  pub temp: TempDir,
  pub spec_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture spec.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    std::fs::write(&env.spec_path, fixture_content(name)).unwrap();
    env.write_file("src/main.c", MAIN_C);
    env
  }

  /// Create an empty test environment.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let spec_path = temp.path().join("Dockerfile");
    Self { temp, spec_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Directory builds are written to.
  pub fn output_path(&self) -> PathBuf {
    self.temp.path().join("out")
  }

  /// Get a Command for the pkgraph binary with configuration variables
  /// cleared.
  pub fn pkgraph_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("pkgraph");
    cmd.env_remove("PKGRAPH_ENTRYPOINT");
    cmd.env_remove("PKGRAPH_SELF_EXE");
    cmd.env_remove("PKGRAPH_MATERIALIZER");
    cmd.current_dir(self.temp.path());
    cmd
  }

  /// `pkgraph <subcommand> <spec>`.
  pub fn spec_cmd(&self, subcommand: &str) -> Command {
    let mut cmd = self.pkgraph_cmd();
    cmd.arg(subcommand).arg(&self.spec_path);
    cmd
  }
}

/// Read every file of a `tar.gz` archive.
pub fn unpack(path: &Path) -> BTreeMap<String, Vec<u8>> {
  let file = std::fs::File::open(path).unwrap();
  let mut archive = tar::Archive::new(GzDecoder::new(file));
  let mut files = BTreeMap::new();
  for entry in archive.entries().unwrap() {
    let mut entry = entry.unwrap();
    if entry.header().entry_type().is_file() {
      let path = entry.path().unwrap().to_string_lossy().trim_start_matches("./").to_string();
      let mut data = Vec::new();
      entry.read_to_end(&mut data).unwrap();
      files.insert(path, data);
    }
  }
  files
}

/// Relative paths of all files below `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
  fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        walk(root, &path, out);
      } else {
        out.push(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
      }
    }
  }
  let mut out = Vec::new();
  walk(dir, dir, &mut out);
  out.sort();
  out
}
