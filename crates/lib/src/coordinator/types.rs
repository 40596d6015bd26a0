//! Types shared between the coordinator, compiler drivers and callers.
//!
//! This module defines the build state, the compiler lifecycle events, the
//! statistics carried by a finished build, and the policy applied to waiting
//! callers when a build fails.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::WatchOptions;

/// Validity of the compiled output held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
  /// The last build succeeded and nothing has invalidated it since.
  Valid,
  /// A build is pending, in flight, or the last one failed.
  Invalid,
}

impl fmt::Display for BuildState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildState::Valid => write!(f, "valid"),
      BuildState::Invalid => write!(f, "invalid"),
    }
  }
}

/// Summary of a finished build, carried by [`BuildEvent::Done`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
  /// Compilation errors. A build with errors did not produce valid output.
  pub errors: Vec<String>,
  /// Non-fatal diagnostics.
  pub warnings: Vec<String>,
  /// Output files written by the build.
  pub outputs: Vec<PathBuf>,
  /// Wall time spent building.
  pub duration: Duration,
}

impl BuildStats {
  /// Stats for a build that failed with a single error.
  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      errors: vec![error.into()],
      ..Self::default()
    }
  }

  pub fn has_errors(&self) -> bool {
    !self.errors.is_empty()
  }
}

/// Lifecycle events emitted by a compiler driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
  /// Sources changed; a rebuild is about to happen.
  Invalid,
  /// A build pass has started.
  BuildStarting,
  /// A build pass has finished, successfully or not.
  Done(BuildStats),
}

/// How the initial build is issued when a pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartMode {
  /// A single build through the driver's `run()`.
  Once,
  /// Continuous rebuilds through the driver's `watch()`.
  Watch(WatchOptions),
}

/// What happens to waiting callers when a build fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
  /// Keep every caller queued until a later build succeeds.
  #[default]
  Stall,
  /// Reject queued waiters with [`BuildFailure`]. Fire-and-forget callbacks
  /// have no error channel and stay queued.
  Reject,
}

/// Delivered to waiters rejected under [`FailurePolicy::Reject`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("build failed with {} error(s)", errors.len())]
pub struct BuildFailure {
  pub errors: Vec<String>,
}

/// Why [`Coordinator::wait_ready`](super::Coordinator::wait_ready) returned without a valid build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
  #[error(transparent)]
  BuildFailed(#[from] BuildFailure),

  /// The coordinator task is gone; no build will ever complete.
  #[error("coordinator is no longer running")]
  Closed,
}

/// Point-in-time view of a coordinator, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
  pub state: BuildState,
  /// A build has been issued or announced and has not finished yet.
  pub building: bool,
  /// Continuations waiting for a valid build.
  pub pending: usize,
  /// A rebuild was requested while a build was in flight.
  pub rebuild_requested: bool,
  /// Builds issued by the coordinator itself (initial build and rebuilds).
  pub builds_issued: u64,
}
