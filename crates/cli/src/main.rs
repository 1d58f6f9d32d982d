mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgraph_lib::consts::FATAL_EXIT_CODE;

use cmd::{BuildCommand, GraphCommand, TargetsCommand};

/// pkgraph - compile package specs into build graphs
#[derive(Parser)]
#[command(name = "pkgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a spec target with the local engine
  Build(BuildCommand),

  /// List the targets a spec can be built for
  Targets(TargetsCommand),

  /// Print the compiled graph of a target as JSON
  Graph(GraphCommand),

  /// Archive a directory into a deterministic tar.gz
  Tar {
    /// Directory to archive
    src: PathBuf,

    /// Archive file to write
    dst: PathBuf,
  },
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build(args) => cmd::cmd_build(&args),
    Commands::Targets(args) => cmd::cmd_targets(&args),
    Commands::Graph(args) => cmd::cmd_graph(&args),
    Commands::Tar { src, dst } => cmd::cmd_tar(&src, &dst),
  }
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  if let Err(e) = run(cli) {
    output::print_error(&format!("{e:#}"));
    std::process::exit(FATAL_EXIT_CODE);
  }
}
