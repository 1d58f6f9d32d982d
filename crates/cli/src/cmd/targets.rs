//! Implementation of the `pkgraph targets` command.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use pkgraph_lib::config::FrontendConfig;
use pkgraph_lib::consts::LIST_TARGETS_REQUEST_ID;
use pkgraph_lib::engine::BuildOpts;
use pkgraph_lib::frontend::{BuildOutcome, BuildSession, Frontend};
use pkgraph_lib::platform::Platform;

use super::{SpecArgs, runtime};
use crate::output::{OutputFormat, print_json, print_targets};

#[derive(Debug, Args)]
pub struct TargetsCommand {
  #[command(flatten)]
  pub spec: SpecArgs,

  /// Platform whose builtin args are available to the spec
  #[arg(long)]
  pub platform: Option<Platform>,

  /// Output format
  #[arg(short = 'o', long = "format", value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,
}

pub fn cmd_targets(args: &TargetsCommand) -> Result<()> {
  let opts = BuildOpts {
    build_args: args.spec.build_args(),
    platforms: args.platform.iter().cloned().collect(),
    request_id: Some(LIST_TARGETS_REQUEST_ID.to_string()),
    ..BuildOpts::default()
  };
  let engine = Arc::new(args.spec.engine(opts)?);
  let frontend = Frontend::standard(FrontendConfig::from_env()?)?;

  let outcome = runtime()?
    .block_on(frontend.handle_build(engine, BuildSession::default()))
    .with_context(|| format!("Failed to list targets of {}", args.spec.spec.display()))?;
  let BuildOutcome::Targets(targets) = outcome else {
    return Err(anyhow!("Engine returned a build result for a target list request"));
  };

  if args.format.is_json() {
    return print_json(&targets);
  }

  print_targets(&targets);
  Ok(())
}
