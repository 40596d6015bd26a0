//! Lua artifact loader.
//!
//! Every call to [`LuaLoader::load`] gets its own Lua state and evaluates the
//! chunk with a dedicated environment table containing:
//! - `module` / `exports` - the module placeholder, `exports` aliases `module.exports`
//! - `__filename` / `__dirname` - identity of the artifact
//! - `console` - `log`, `info`, `warn`, `error`, `debug`, forwarded to tracing
//! - `process` - `platform`, `arch`, `pid`, `cwd()` and (unless restricted) `env`
//! - `require` - Lua's `require`, searching `__dirname` first
//!
//! Reads of any other name fall through to the state's globals. Writes stay in
//! the environment table, so top-level assignments never become globals.

use std::path::Path;

use mlua::prelude::*;
use mlua::{ChunkMode, StdLib};
use tracing::{debug, error, info, warn};

use super::{Artifact, ArtifactLoader, LoadError, Sandbox};

fn restricted_libs() -> StdLib {
  StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE | StdLib::PACKAGE
}

/// Loads Lua artifacts into fresh, isolated Lua states.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaLoader {
  sandbox: Sandbox,
}

impl LuaLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_sandbox(sandbox: Sandbox) -> Self {
    Self { sandbox }
  }

  fn create_state(&self) -> LuaResult<Lua> {
    match self.sandbox {
      Sandbox::Full => Ok(Lua::new()),
      Sandbox::Restricted => Lua::new_with(restricted_libs(), LuaOptions::default()),
    }
  }

  /// Build the environment table the chunk runs in.
  fn create_environment(&self, lua: &Lua, filename: &Path, module: &LuaTable) -> LuaResult<LuaTable> {
    let dir = filename
      .parent()
      .unwrap_or(Path::new("."))
      .to_string_lossy()
      .into_owned();

    // Modules next to the artifact take precedence over the default search path
    let package: LuaTable = lua.globals().get("package")?;
    let package_path: String = package.get("path")?;
    package.set("path", format!("{dir}/?.lua;{dir}/?/init.lua;{package_path}"))?;

    let env = lua.create_table()?;
    env.set("module", module.clone())?;
    env.set("exports", module.get::<LuaValue>("exports")?)?;
    env.set("__filename", filename.to_string_lossy().into_owned())?;
    env.set("__dirname", dir)?;
    env.set("console", create_console(lua, filename)?)?;
    env.set("process", create_process(lua, self.sandbox)?)?;
    env.set("require", lua.globals().get::<LuaValue>("require")?)?;

    // Read-through to globals only; no __newindex, so writes stay local
    let mt = lua.create_table()?;
    mt.set("__index", lua.globals())?;
    env.set_metatable(Some(mt))?;

    Ok(env)
  }
}

impl ArtifactLoader for LuaLoader {
  fn load(&self, code: &[u8], filename: &Path) -> Result<Artifact, LoadError> {
    let setup_err = |e: LuaError| LoadError::Setup {
      filename: filename.to_path_buf(),
      message: e.to_string(),
    };

    let lua = self.create_state().map_err(setup_err)?;
    let module = lua.create_table().map_err(setup_err)?;
    module
      .set("exports", lua.create_table().map_err(setup_err)?)
      .map_err(setup_err)?;
    let env = self.create_environment(&lua, filename, &module).map_err(setup_err)?;

    let chunk = lua
      .load(code)
      .set_name(format!("@{}", filename.display()))
      .set_mode(ChunkMode::Text)
      .set_environment(env)
      .into_function()
      .map_err(|e| LoadError::Syntax {
        filename: filename.to_path_buf(),
        message: e.to_string(),
      })?;

    let returned: LuaValue = chunk.call(()).map_err(|e| LoadError::Runtime {
      filename: filename.to_path_buf(),
      message: e.to_string(),
    })?;

    // A returned value wins over whatever was assigned to module.exports
    let exports = if returned.is_nil() {
      module.get::<LuaValue>("exports").map_err(setup_err)?
    } else {
      returned
    };

    debug!(file = %filename.display(), exports = exports.type_name(), "loaded artifact");
    Ok(Artifact::new(lua, exports, filename))
  }
}

/// `console.*` functions forwarding to tracing under the `kiln::artifact` target.
fn create_console(lua: &Lua, filename: &Path) -> LuaResult<LuaTable> {
  let console = lua.create_table()?;
  let file = filename.display().to_string();

  for level in ["log", "info", "warn", "error", "debug"] {
    let file = file.clone();
    let function = lua.create_function(move |lua, args: LuaMultiValue| {
      let tostring: LuaFunction = lua.globals().get("tostring")?;
      let mut parts = Vec::with_capacity(args.len());
      for arg in args {
        parts.push(tostring.call::<String>(arg)?);
      }
      let message = parts.join(" ");
      match level {
        "warn" => warn!(target: "kiln::artifact", file = %file, "{}", message),
        "error" => error!(target: "kiln::artifact", file = %file, "{}", message),
        "debug" => debug!(target: "kiln::artifact", file = %file, "{}", message),
        _ => info!(target: "kiln::artifact", file = %file, "{}", message),
      }
      Ok(())
    })?;
    console.set(level, function)?;
  }

  Ok(console)
}

/// `process` table describing the host process.
fn create_process(lua: &Lua, sandbox: Sandbox) -> LuaResult<LuaTable> {
  let process = lua.create_table()?;
  process.set("platform", std::env::consts::OS)?;
  process.set("arch", std::env::consts::ARCH)?;
  process.set("pid", std::process::id())?;

  let cwd = lua.create_function(|_, ()| {
    let dir = std::env::current_dir().map_err(LuaError::external)?;
    Ok(dir.to_string_lossy().into_owned())
  })?;
  process.set("cwd", cwd)?;

  if sandbox == Sandbox::Full {
    let env = lua.create_table()?;
    for (key, value) in std::env::vars() {
      env.set(key, value)?;
    }
    process.set("env", env)?;
  }

  Ok(process)
}
