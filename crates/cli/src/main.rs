mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// kiln - build-state coordinator for compiled Lua artifacts
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the pipeline config (default: kiln.json, kiln.yaml or kiln.yml in the current directory)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every entry once
  Build {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build, then load an artifact and show its exports
  Resolve {
    /// Entry name
    name: String,

    /// Call this exported function and print the result
    #[arg(long)]
    call: Option<String>,

    /// Argument passed to the called function (repeatable)
    #[arg(long = "arg", requires = "call")]
    args: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Rebuild on source changes; read commands from stdin
  Watch {
    /// Quiet period after a change before rebuilding (e.g. "250ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    debounce: Option<Duration>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) if cli.verbose => EnvFilter::new("warn,kiln=debug,kiln_lib=debug,kiln_cli=debug"),
    Err(_) => EnvFilter::new("warn"),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();
  match cli.command {
    Commands::Build { output } => cmd::cmd_build(config, output),
    Commands::Resolve {
      name,
      call,
      args,
      output,
    } => cmd::cmd_resolve(config, &name, call.as_deref(), args, output),
    Commands::Watch { debounce } => cmd::cmd_watch(config, debounce),
  }
}
