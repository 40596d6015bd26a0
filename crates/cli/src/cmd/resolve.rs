//! Implementation of the `kiln resolve` command.

use std::path::Path;

use anyhow::{Result, anyhow};
use kiln_lib::Pipeline;
use kiln_lib::coordinator::{FailurePolicy, StartMode};
use kiln_lib::loader::Artifact;
use mlua::prelude::*;
use mlua::Variadic;

use super::{load_config, run_local};
use crate::output::{OutputFormat, print_json, print_stat, print_success};

/// Build once, resolve `name` and print its exports or the result of a call.
pub fn cmd_resolve(
  config: Option<&Path>,
  name: &str,
  call: Option<&str>,
  args: Vec<String>,
  format: OutputFormat,
) -> Result<()> {
  let mut config = load_config(config)?;
  config.failure_policy = FailurePolicy::Reject;

  run_local(async {
    let pipeline = Pipeline::start(&config, StartMode::Once)?;
    let result = pipeline.resolve(name).await;
    pipeline.shutdown().await;

    let artifact = result?;
    match call {
      Some(function) => print_call(&artifact, name, function, args, format),
      None => print_exports(&artifact, name, format),
    }
  })?
}

pub(super) fn print_exports(artifact: &Artifact, name: &str, format: OutputFormat) -> Result<()> {
  // mlua errors are not Send + Sync
  let exports = artifact.describe().map_err(|e| anyhow!("{}", e))?;

  if format.is_json() {
    return print_json(&serde_json::json!({
      "name": name,
      "source": artifact.filename(),
      "exports": exports,
    }));
  }

  print_success(&format!("Resolved {} ({})", name, artifact.filename().display()));
  for (key, kind) in &exports {
    print_stat(key, kind);
  }
  Ok(())
}

fn print_call(artifact: &Artifact, name: &str, function: &str, args: Vec<String>, format: OutputFormat) -> Result<()> {
  let result: LuaValue = artifact
    .call(function, Variadic::from_iter(args))
    .map_err(|e| anyhow!("Calling {}.{} failed: {}", name, function, e))?;

  let json = serde_json::to_value(result.to_serializable().deny_unsupported_types(false))?;

  if format.is_json() {
    return print_json(&serde_json::json!({
      "name": name,
      "function": function,
      "result": json,
    }));
  }

  match &result {
    LuaValue::String(s) => println!("{}", s.to_string_lossy()),
    LuaValue::Table(_) => println!("{}", serde_json::to_string_pretty(&json)?),
    other => {
      let tostring: LuaFunction = artifact.lua().globals().get("tostring").map_err(|e| anyhow!("{}", e))?;
      let text: String = tostring.call(other.clone()).map_err(|e| anyhow!("{}", e))?;
      println!("{}", text);
    }
  }
  Ok(())
}
