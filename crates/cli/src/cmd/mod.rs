mod build;
mod graph;
mod tar;
mod targets;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use pkgraph_lib::config::{FrontendConfig, MaterializerKind};
use pkgraph_lib::consts::{DEFAULT_CONTEXT_NAME, ENTRYPOINT_CONTEXT_NAME};
use pkgraph_lib::engine::{BuildOpts, Capabilities, LocalEngine};
use pkgraph_lib::frontend::BuildSession;
use pkgraph_lib::materialize::InlineArchiveMaterializer;
use pkgraph_lib::platform::Platform;

pub use build::{BuildCommand, cmd_build};
pub use graph::{GraphCommand, cmd_graph};
pub use tar::cmd_tar;
pub use targets::{TargetsCommand, cmd_targets};

/// Parse a `KEY=VALUE` pair.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got {s:?}")),
  }
}

/// Where to find the spec and what to substitute into it.
#[derive(Debug, Args)]
pub struct SpecArgs {
  /// Path to the spec file
  pub spec: PathBuf,

  /// Directory served as the default build context (default: the spec's directory)
  #[arg(long)]
  pub context: Option<PathBuf>,

  /// Additional named build context
  #[arg(long = "build-context", value_name = "NAME=DIR", value_parser = parse_key_value)]
  pub build_contexts: Vec<(String, String)>,

  /// Build arg substituted into the spec
  #[arg(long = "build-arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
  pub build_args: Vec<(String, String)>,
}

impl SpecArgs {
  pub fn build_args(&self) -> BTreeMap<String, String> {
    self.build_args.iter().cloned().collect()
  }

  fn spec_dir(&self) -> Result<PathBuf> {
    let dir = match self.spec.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    std::fs::canonicalize(&dir).with_context(|| format!("Spec directory not found: {}", dir.display()))
  }

  fn entrypoint(&self) -> Result<String> {
    self
      .spec
      .file_name()
      .map(|name| name.to_string_lossy().to_string())
      .ok_or_else(|| anyhow!("Spec path has no file name: {}", self.spec.display()))
  }

  /// A local engine serving the spec's directory and the build contexts.
  pub fn engine(&self, mut opts: BuildOpts) -> Result<LocalEngine> {
    if !self.spec.is_file() {
      return Err(anyhow!("Spec file not found: {}", self.spec.display()));
    }
    let spec_dir = self.spec_dir()?;
    opts.entrypoint = Some(self.entrypoint()?);

    let context = self.context.clone().unwrap_or_else(|| spec_dir.clone());
    let mut engine = LocalEngine::new(opts)
      .with_context(ENTRYPOINT_CONTEXT_NAME, &spec_dir)
      .with_context(DEFAULT_CONTEXT_NAME, existing_dir(&context)?);
    for (name, dir) in &self.build_contexts {
      engine = engine.with_context(name.clone(), existing_dir(Path::new(dir))?);
    }
    Ok(engine)
  }
}

fn existing_dir(dir: &Path) -> Result<PathBuf> {
  if !dir.is_dir() {
    return Err(anyhow!("Build context is not a directory: {}", dir.display()));
  }
  Ok(dir.to_path_buf())
}

/// Options shared by the commands that compile a graph.
#[derive(Debug, Args)]
pub struct CompileArgs {
  /// Target to build (default: the default route)
  #[arg(short, long, default_value = "")]
  pub target: String,

  /// Platform to build for, as os/arch[/variant] (repeatable)
  #[arg(long = "platform")]
  pub platforms: Vec<Platform>,

  /// Copy sources in place instead of merging per-source layers
  #[arg(long)]
  pub no_merge: bool,

  /// How directory sources are archived: self-exec or inline
  #[arg(long)]
  pub materializer: Option<MaterializerKind>,
}

impl CompileArgs {
  pub fn caps(&self) -> Capabilities {
    if self.no_merge {
      Capabilities::none()
    } else {
      Capabilities::all()
    }
  }

  /// Environment configuration with command-line overrides applied.
  pub fn config(&self) -> Result<FrontendConfig> {
    let mut config = FrontendConfig::from_env().context("Invalid frontend configuration")?;
    if let Some(kind) = self.materializer {
      config.materializer = kind;
    }
    Ok(config)
  }

  pub fn session(&self, config: &FrontendConfig, engine: &LocalEngine) -> BuildSession {
    match config.materializer {
      MaterializerKind::SelfExec => BuildSession::default().with_frontend_image(engine.frontend_image()),
      MaterializerKind::Inline => BuildSession::default()
        .with_materializer(Arc::new(InlineArchiveMaterializer::new(Arc::new(engine.sources())))),
    }
  }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_key_value_pairs() {
    assert_eq!(
      parse_key_value("VERSION=1.2.3"),
      Ok(("VERSION".to_string(), "1.2.3".to_string()))
    );
    assert_eq!(parse_key_value("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
    assert_eq!(
      parse_key_value("A=b=c"),
      Ok(("A".to_string(), "b=c".to_string()))
    );
    assert!(parse_key_value("novalue").is_err());
    assert!(parse_key_value("=x").is_err());
  }
}
