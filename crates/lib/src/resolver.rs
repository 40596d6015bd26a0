//! Artifact resolution.
//!
//! [`Resolver::resolve`] is the only way callers obtain compiled artifacts. It
//! waits through the coordinator until the output is valid, then reads the
//! artifact from the output store and evaluates it with the loader.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::{EntryMap, OutputLayout, OutputMode};
use crate::coordinator::{BuildFailure, Coordinator, WaitError};
use crate::loader::{Artifact, ArtifactLoader, LoadError};
use crate::store::OutputStore;

/// Errors returned by [`Resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("unknown artifact: {0}")]
  UnknownArtifact(String),

  #[error("failed to read artifact {}: {source}", path.display())]
  ArtifactRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Load(#[from] LoadError),

  /// The combined output holds no export for this entry.
  #[error("combined output {} has no export named '{name}'", path.display())]
  MissingExport { name: String, path: PathBuf },

  #[error(transparent)]
  BuildFailed(BuildFailure),

  #[error("timed out after {}ms waiting for '{name}'", .elapsed.as_millis())]
  Timeout { name: String, elapsed: Duration },

  #[error("coordinator is no longer running")]
  CoordinatorClosed,
}

impl From<WaitError> for ResolveError {
  fn from(err: WaitError) -> Self {
    match err {
      WaitError::BuildFailed(failure) => ResolveError::BuildFailed(failure),
      WaitError::Closed => ResolveError::CoordinatorClosed,
    }
  }
}

/// Resolves entry names to loaded artifacts once the build is valid.
#[derive(Clone)]
pub struct Resolver<S, L> {
  coordinator: Coordinator,
  entries: Arc<EntryMap>,
  layout: OutputLayout,
  store: S,
  loader: L,
}

impl<S, L> Resolver<S, L>
where
  S: OutputStore,
  L: ArtifactLoader,
{
  pub fn new(coordinator: Coordinator, entries: Arc<EntryMap>, layout: OutputLayout, store: S, loader: L) -> Self {
    Self {
      coordinator,
      entries,
      layout,
      store,
      loader,
    }
  }

  /// Resolve `name`, waiting for a valid build first.
  ///
  /// Unknown names fail immediately without waiting. Dropping the returned
  /// future cancels the wait.
  pub async fn resolve(&self, name: &str) -> Result<Artifact, ResolveError> {
    let entry = self
      .entries
      .get(name)
      .ok_or_else(|| ResolveError::UnknownArtifact(name.to_string()))?;
    let path = self.layout.output_path(name);

    debug!(artifact = %name, path = %path.display(), "waiting for valid build");
    self.coordinator.wait_ready().await?;
    debug!(artifact = %name, path = %path.display(), "build valid, loading artifact");

    let code = self
      .store
      .read_file(&path)
      .await
      .map_err(|source| ResolveError::ArtifactRead {
        path: path.clone(),
        source,
      })?;

    let artifact = self.loader.load(&code, &entry.source)?;

    match self.layout.mode() {
      OutputMode::Single => Ok(artifact),
      OutputMode::Combined => artifact.select(name).ok_or_else(|| ResolveError::MissingExport {
        name: name.to_string(),
        path,
      }),
    }
  }

  /// Like [`resolve`](Self::resolve), failing with [`ResolveError::Timeout`]
  /// if no valid build arrives within `timeout`.
  pub async fn resolve_timeout(&self, name: &str, timeout: Duration) -> Result<Artifact, ResolveError> {
    match tokio::time::timeout(timeout, self.resolve(name)).await {
      Ok(result) => result,
      Err(_) => Err(ResolveError::Timeout {
        name: name.to_string(),
        elapsed: timeout,
      }),
    }
  }

  /// Run `callback` once the output is valid.
  pub fn resolve_when_ready(&self, callback: impl FnOnce() + 'static) {
    self.coordinator.when_ready(callback);
  }

  pub fn entries(&self) -> &EntryMap {
    &self.entries
  }

  pub fn output_path(&self, name: &str) -> Option<PathBuf> {
    self.entries.contains(name).then(|| self.layout.output_path(name))
  }

  pub fn coordinator(&self) -> &Coordinator {
    &self.coordinator
  }
}
