//! Implementation of the `pkgraph graph` command.
//!
//! Compiles the spec exactly as a build would and prints the marshaled
//! definition instead of solving it.

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use pkgraph_lib::compile::CompileContext;
use pkgraph_lib::engine::{BuildOpts, SolveRequest};
use pkgraph_lib::frontend::Frontend;
use pkgraph_lib::platform::Platform;
use pkgraph_lib::spec::load_for_platform;

use super::{CompileArgs, SpecArgs};
use crate::output::print_json;

#[derive(Debug, Args)]
pub struct GraphCommand {
  #[command(flatten)]
  pub spec: SpecArgs,

  #[command(flatten)]
  pub compile: CompileArgs,
}

pub fn cmd_graph(args: &GraphCommand) -> Result<()> {
  let platform = match args.compile.platforms.first() {
    Some(platform) => platform.clone(),
    None => Platform::current().ok_or_else(|| anyhow!("Host platform is not supported, pass --platform"))?,
  };
  let config = args.compile.config()?;
  let engine = args.spec.engine(BuildOpts::default())?;
  let session = args.compile.session(&config, &engine);
  let frontend = Frontend::standard(config)?;

  let build_args = args.spec.build_args();
  let bytes = std::fs::read(&args.spec.spec).with_context(|| format!("Failed to read {}", args.spec.spec.display()))?;
  let spec = load_for_platform(&bytes, &build_args, Some(&platform))
    .with_context(|| format!("Failed to load {}", args.spec.spec.display()))?;

  let context = CompileContext::new(args.compile.caps().merge_capable(), Some(frontend.materializer(&session)));
  let request = frontend.compile(&spec, &args.compile.target, &context, &build_args, &platform)?;

  match request {
    SolveRequest::Definition(def) => {
      let mut stdout = std::io::stdout().lock();
      stdout.write_all(&def.to_json()?)?;
      writeln!(stdout)?;
      Ok(())
    }
    SolveRequest::Forward(forward) => print_json(&serde_json::json!({
      "forward": {
        "frontend": forward.frontend.image,
        "target": forward.target,
        "platform": forward.platform.to_string(),
      }
    })),
  }
}
