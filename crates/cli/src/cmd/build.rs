//! Implementation of the `pkgraph build` command.
//!
//! Runs a full build session against the local engine and optionally
//! writes the resulting trees to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use pkgraph_lib::archive::write_tree;
use pkgraph_lib::engine::{BuildOpts, LocalEngine};
use pkgraph_lib::frontend::{BuildOutcome, BuildResult, Frontend};

use super::{CompileArgs, SpecArgs, runtime};
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_platform_result, print_success};

#[derive(Debug, Args)]
pub struct BuildCommand {
  #[command(flatten)]
  pub spec: SpecArgs,

  #[command(flatten)]
  pub compile: CompileArgs,

  /// Directory to write the built tree to
  #[arg(long)]
  pub output: Option<PathBuf>,

  /// Output format
  #[arg(short = 'o', long = "format", value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,
}

pub fn cmd_build(args: &BuildCommand) -> Result<()> {
  let started = Instant::now();
  let config = args.compile.config()?;
  let opts = BuildOpts {
    target: args.compile.target.clone(),
    build_args: args.spec.build_args(),
    platforms: args.compile.platforms.clone(),
    caps: args.compile.caps(),
    ..BuildOpts::default()
  };
  let engine = Arc::new(args.spec.engine(opts)?);
  let session = args.compile.session(&config, &engine);
  let frontend = Frontend::standard(config)?;

  let outcome = runtime()?
    .block_on(frontend.handle_build(engine.clone(), session))
    .with_context(|| format!("Failed to build {}", args.spec.spec.display()))?;
  let BuildOutcome::Build(result) = outcome else {
    return Err(anyhow!("Engine returned a target list for a build request"));
  };

  let written = match &args.output {
    Some(dir) => Some(write_results(&engine, &result, dir)?),
    None => None,
  };

  if args.format.is_json() {
    let refs: serde_json::Map<String, serde_json::Value> = result
      .refs
      .iter()
      .map(|(platform, reference)| (platform.to_string(), reference.0.clone().into()))
      .collect();
    print_json(&serde_json::json!({
      "target": args.compile.target,
      "results": refs,
      "output": written.map(|paths| paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>()),
    }))?;
  } else {
    let target = if args.compile.target.is_empty() {
      "default target"
    } else {
      args.compile.target.as_str()
    };
    print_success(&format!(
      "Built {target} for {} platform(s) in {}",
      result.refs.len(),
      format_duration(started.elapsed())
    ));
    for (platform, reference) in &result.refs {
      print_platform_result(platform, reference);
    }
    if let Some(paths) = written {
      for path in paths {
        print_info(&format!("Wrote {}", path.display()));
      }
    }
  }

  Ok(())
}

/// Write each platform's tree below `dir`, in a per-platform directory
/// when there are several.
fn write_results(engine: &LocalEngine, result: &BuildResult, dir: &Path) -> Result<Vec<PathBuf>> {
  let mut written = Vec::new();
  let single = result.refs.len() == 1;
  for (platform, reference) in &result.refs {
    let tree = engine
      .result(reference)
      .ok_or_else(|| anyhow!("No result stored for {platform}"))?;
    let dst = if single { dir.to_path_buf() } else { dir.join(platform.dir_name()) };
    write_tree(&tree, &dst).with_context(|| format!("Failed to write {}", dst.display()))?;
    written.push(dst);
  }
  Ok(written)
}
