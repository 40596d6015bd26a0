//! Implementation of the `kiln build` command.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Result, bail};
use kiln_lib::Pipeline;
use kiln_lib::coordinator::{FailurePolicy, StartMode, WaitError};
use serde::Serialize;
use tracing::debug;

use super::{load_config, run_local};
use crate::output::{OutputFormat, format_duration, print_error, print_json, print_stat, print_success, symbols};

#[derive(Serialize)]
struct BuildReport {
  outputs: Vec<PathBuf>,
  duration_ms: u128,
}

/// Build every entry once and report the output files.
///
/// Failed builds are rejected rather than stalled, so the command exits with
/// an error instead of waiting forever.
pub fn cmd_build(config: Option<&Path>, format: OutputFormat) -> Result<()> {
  let mut config = load_config(config)?;
  config.failure_policy = FailurePolicy::Reject;

  let started = Instant::now();
  let (result, outputs) = run_local(async {
    let pipeline = Pipeline::start(&config, StartMode::Once)?;
    let result = pipeline.coordinator().wait_ready().await;
    let resolver = pipeline.resolver();
    let outputs: BTreeSet<PathBuf> = resolver
      .entries()
      .names()
      .filter_map(|name| resolver.output_path(name))
      .collect();
    pipeline.shutdown().await;
    anyhow::Ok((result, outputs))
  })??;
  let elapsed = started.elapsed();
  debug!(elapsed_ms = elapsed.as_millis() as u64, "build command finished");

  match result {
    Ok(()) => {}
    Err(WaitError::BuildFailed(failure)) => {
      for error in &failure.errors {
        print_error(error);
      }
      bail!("Build failed with {} error(s)", failure.errors.len());
    }
    Err(WaitError::Closed) => bail!("Build coordinator stopped unexpectedly"),
  }

  if format.is_json() {
    return print_json(&BuildReport {
      outputs: outputs.into_iter().collect(),
      duration_ms: elapsed.as_millis(),
    });
  }

  print_success(&format!("Built {} output(s)", outputs.len()));
  for path in &outputs {
    println!("  {} {}", symbols::ARROW, path.display());
  }
  print_stat("Duration", &format_duration(elapsed));
  Ok(())
}
