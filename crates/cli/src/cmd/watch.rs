//! Implementation of the `kiln watch` command.
//!
//! Starts the pipeline in watch mode and reads commands from stdin, one per line:
//! - an entry name resolves it in the background and prints its exports
//! - `r` requests a rebuild
//! - `s` prints the coordinator status
//! - `q` quits (so does end of input)

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use kiln_lib::coordinator::{BuildState, StartMode};
use kiln_lib::{Pipeline, ResolveError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

use super::resolve::print_exports;
use super::{load_config, run_local};
use crate::output::{OutputFormat, print_error, print_info, print_stat, print_warning};

const STATUS_POLL: Duration = Duration::from_millis(50);

pub fn cmd_watch(config: Option<&Path>, debounce: Option<Duration>) -> Result<()> {
  let mut config = load_config(config)?;
  if let Some(debounce) = debounce {
    config.watch.debounce_ms = debounce.as_millis() as u64;
  }
  let options = config.watch.options();

  run_local(async {
    let pipeline = Pipeline::start(&config, StartMode::Watch(options))?;
    print_info(&format!(
      "Watching {} entr{} (enter a name, 'r' to rebuild, 's' for status, 'q' to quit)",
      pipeline.resolver().entries().len(),
      if pipeline.resolver().entries().len() == 1 { "y" } else { "ies" }
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut resolves = JoinSet::new();
    loop {
      let line = tokio::select! {
        Some(joined) = resolves.join_next(), if !resolves.is_empty() => {
          if let Err(e) = joined {
            debug!(error = %e, "resolve task ended abnormally");
          }
          continue;
        }
        line = lines.next_line() => line.context("Failed to read stdin")?,
      };
      let Some(line) = line else { break };

      match line.trim() {
        "" => continue,
        "q" => break,
        "r" => {
          pipeline.coordinator().request_rebuild();
          print_info("Rebuild requested");
        }
        "s" => {
          let status = pipeline.coordinator().status().await?;
          print_stat("state", &status.state.to_string());
          print_stat("building", &status.building.to_string());
          print_stat("pending", &status.pending.to_string());
          print_stat("rebuild requested", &status.rebuild_requested.to_string());
          print_stat("builds issued", &status.builds_issued.to_string());
        }
        name => {
          let resolver = pipeline.resolver().clone();
          let name = name.to_string();
          resolves.spawn_local(async move {
            match resolver.resolve(&name).await {
              Ok(artifact) => {
                if let Err(e) = print_exports(&artifact, &name, OutputFormat::Text) {
                  print_error(&e.to_string());
                }
              }
              Err(ResolveError::UnknownArtifact(name)) => print_warning(&format!("Unknown entry: {}", name)),
              Err(e) => print_error(&e.to_string()),
            }
          });
        }
      }
    }

    finish_resolves(&pipeline, &mut resolves).await?;
    debug!("stopping watch");
    pipeline.shutdown().await;
    anyhow::Ok(())
  })?
}

/// Let outstanding resolves finish, abandoning them once the build is failing
/// with nothing in flight to fix it.
async fn finish_resolves(pipeline: &Pipeline, resolves: &mut JoinSet<()>) -> Result<()> {
  while !resolves.is_empty() {
    let status = pipeline.coordinator().status().await?;
    if status.state == BuildState::Invalid && !status.building {
      print_warning(&format!(
        "Abandoning {} pending resolve(s): the build is failing",
        resolves.len()
      ));
      resolves.shutdown().await;
      break;
    }

    tokio::select! {
      _ = resolves.join_next() => {}
      _ = tokio::time::sleep(STATUS_POLL) => {}
    }
  }
  Ok(())
}
