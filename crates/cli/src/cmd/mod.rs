mod build;
mod resolve;
mod watch;

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use kiln_lib::config::Config;
use tokio::task::LocalSet;

pub use build::cmd_build;
pub use resolve::cmd_resolve;
pub use watch::cmd_watch;

/// Load the given config, or discover one in the current directory.
fn load_config(path: Option<&Path>) -> Result<Config> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => {
      let cwd = std::env::current_dir().context("Failed to read current directory")?;
      Config::discover(&cwd)?
    }
  };
  Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Run `future` to completion on a current-thread runtime inside a `LocalSet`.
fn run_local<F: Future>(future: F) -> Result<F::Output> {
  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;
  Ok(rt.block_on(LocalSet::new().run_until(future)))
}
