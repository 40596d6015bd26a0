//! Pipeline wiring.
//!
//! A [`Pipeline`] assembles the pieces described by a [`Config`]: the entry
//! map, the output store, the passthrough compiler, the coordinator task and
//! the resolver callers use.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{Config, ConfigError, EntryMap};
use crate::coordinator::{Coordinator, StartMode};
use crate::driver::{PassthroughCompiler, event_channel};
use crate::loader::{Artifact, LuaLoader};
use crate::resolver::{ResolveError, Resolver};
use crate::store::Store;

/// A running build pipeline.
pub struct Pipeline {
  resolver: Resolver<Store, LuaLoader>,
  task: JoinHandle<()>,
}

impl Pipeline {
  /// Assemble the pipeline and issue the initial build.
  ///
  /// Must be called from within a `LocalSet`. Entry resolution failures are
  /// fatal; driver failures surface as failed builds.
  pub fn start(config: &Config, mode: StartMode) -> Result<Self, ConfigError> {
    let entries = Arc::new(EntryMap::assemble(config)?);
    let layout = config.layout();
    let store = Store::new(config.output.store);
    let loader = LuaLoader::with_sandbox(config.loader.sandbox);

    let (sink, events) = event_channel();
    let compiler = PassthroughCompiler::new(Arc::clone(&entries), layout.clone(), store.clone(), sink);
    let (coordinator, task) = Coordinator::spawn(compiler, events, config.failure_policy);

    info!(
      entries = entries.len(),
      output = %layout.dir().display(),
      mode = ?layout.mode(),
      store = ?store.kind(),
      policy = ?config.failure_policy,
      "pipeline started"
    );
    coordinator.start(mode);

    Ok(Self {
      resolver: Resolver::new(coordinator, entries, layout, store, loader),
      task,
    })
  }

  pub fn resolver(&self) -> &Resolver<Store, LuaLoader> {
    &self.resolver
  }

  pub fn coordinator(&self) -> &Coordinator {
    self.resolver.coordinator()
  }

  pub async fn resolve(&self, name: &str) -> Result<Artifact, ResolveError> {
    self.resolver.resolve(name).await
  }

  /// Stop the coordinator and wait for its task to finish.
  ///
  /// Clones of the coordinator handle held elsewhere keep the task alive.
  pub async fn shutdown(self) {
    drop(self.resolver);
    let _ = self.task.await;
  }
}
