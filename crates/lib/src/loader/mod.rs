//! Artifact loading.
//!
//! An [`ArtifactLoader`] turns compiled source text into a live module object.
//! The loader is a capability: the resolver only depends on the trait, so a
//! stricter strategy can replace [`LuaLoader`] without touching the
//! coordinator.
//!
//! # Submodules
//!
//! - [`lua`] - Loader evaluating Lua chunks in a fresh, isolated Lua state

pub mod lua;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use mlua::{FromLua, FromLuaMulti, IntoLuaMulti};
use serde::Deserialize;
use thiserror::Error;

pub use lua::LuaLoader;

/// Evaluates compiled artifacts.
pub trait ArtifactLoader {
  /// Evaluate `code` as the module identified by `filename` and return its exports.
  fn load(&self, code: &[u8], filename: &Path) -> Result<Artifact, LoadError>;
}

/// Errors raised while evaluating an artifact.
///
/// Lua messages are kept as strings so the error can cross threads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
  /// The artifact is not valid Lua.
  #[error("syntax error in {}: {message}", filename.display())]
  Syntax { filename: PathBuf, message: String },

  /// The artifact raised an error while running.
  #[error("error evaluating {}: {message}", filename.display())]
  Runtime { filename: PathBuf, message: String },

  /// The isolated environment could not be prepared.
  #[error("failed to prepare environment for {}: {message}", filename.display())]
  Setup { filename: PathBuf, message: String },
}

/// Which standard libraries an artifact may reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sandbox {
  /// Lua's safe standard library set, including `io` and `os`.
  #[default]
  Full,
  /// Only `table`, `string`, `math`, `utf8`, `coroutine` and `package`.
  /// `process.env` is not exposed.
  Restricted,
}

/// The exports of an evaluated artifact.
///
/// Holds the Lua state the artifact was evaluated in, so exported functions
/// stay callable for as long as the artifact is alive.
pub struct Artifact {
  lua: Lua,
  exports: LuaValue,
  filename: PathBuf,
}

impl Artifact {
  pub fn new(lua: Lua, exports: LuaValue, filename: impl Into<PathBuf>) -> Self {
    Self {
      lua,
      exports,
      filename: filename.into(),
    }
  }

  pub fn exports(&self) -> &LuaValue {
    &self.exports
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }

  /// Source file the artifact was loaded as.
  pub fn filename(&self) -> &Path {
    &self.filename
  }

  pub fn table(&self) -> Option<&LuaTable> {
    match &self.exports {
      LuaValue::Table(table) => Some(table),
      _ => None,
    }
  }

  pub fn function(&self) -> Option<&LuaFunction> {
    match &self.exports {
      LuaValue::Function(function) => Some(function),
      _ => None,
    }
  }

  /// Read an exported field. Fails if the exports are not a table.
  pub fn get<V: FromLua>(&self, key: &str) -> LuaResult<V> {
    match self.table() {
      Some(table) => table.get(key),
      None => Err(LuaError::external(format!(
        "exports of {} are a {}, not a table",
        self.filename.display(),
        self.exports.type_name()
      ))),
    }
  }

  /// Call an exported function.
  pub fn call<R: FromLuaMulti>(&self, key: &str, args: impl IntoLuaMulti) -> LuaResult<R> {
    let function: LuaFunction = self.get(key)?;
    function.call(args)
  }

  /// Narrow a combined export table to the value keyed by `name`.
  ///
  /// Returns `None` when the exports are not a table or hold nothing under `name`.
  pub fn select(&self, name: &str) -> Option<Artifact> {
    let value: LuaValue = self.table()?.get(name).ok()?;
    if value.is_nil() {
      return None;
    }
    Some(Artifact::new(self.lua.clone(), value, self.filename.clone()))
  }

  /// Exported keys mapped to their Lua type names.
  ///
  /// Non-table exports are described under the single key `"<exports>"`.
  pub fn describe(&self) -> LuaResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    let Some(table) = self.table() else {
      out.insert("<exports>".to_string(), self.exports.type_name().to_string());
      return Ok(out);
    };

    for pair in table.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = match key {
        LuaValue::String(s) => s.to_string_lossy(),
        LuaValue::Integer(i) => i.to_string(),
        other => format!("<{}>", other.type_name()),
      };
      out.insert(key, value.type_name().to_string());
    }
    Ok(out)
  }
}

impl fmt::Debug for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Artifact")
      .field("filename", &self.filename)
      .field("exports", &self.exports.type_name())
      .finish()
  }
}
