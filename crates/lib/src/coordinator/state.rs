//! The build-state machine.
//!
//! [`BuildCoordinator`] owns the build state, the pending-continuation queue and
//! the rebuild flag. It is synchronous and single-owner: the actor in
//! [`super`] is the only code that drives it in production, and tests drive it
//! directly to check ordering without a runtime.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::types::{BuildFailure, BuildState, BuildStats, CoordinatorStatus, FailurePolicy, StartMode};
use crate::driver::{CompilerDriver, DriverError};

/// A continuation waiting for a valid build.
pub enum Pending {
  /// Fire-and-forget callback.
  Callback(Box<dyn FnOnce()>),
  /// Promise-style waiter; the receiving side may be dropped to cancel.
  Waiter(oneshot::Sender<Result<(), BuildFailure>>),
}

impl Pending {
  fn is_cancelled(&self) -> bool {
    match self {
      Pending::Callback(_) => false,
      Pending::Waiter(tx) => tx.is_closed(),
    }
  }

  fn fire(self) {
    match self {
      // A panicking callback must not take the coordinator down with it.
      Pending::Callback(callback) => {
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
          error!("ready callback panicked");
        }
      }
      // A dropped receiver means the caller gave up waiting.
      Pending::Waiter(tx) => {
        let _ = tx.send(Ok(()));
      }
    }
  }
}

impl std::fmt::Debug for Pending {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Pending::Callback(_) => write!(f, "Pending::Callback"),
      Pending::Waiter(_) => write!(f, "Pending::Waiter"),
    }
  }
}

/// Tracks output validity and gates builds so at most one is in flight.
pub struct BuildCoordinator {
  driver: Box<dyn CompilerDriver>,
  policy: FailurePolicy,
  state: BuildState,
  building: bool,
  force_rebuild: bool,
  settle_scheduled: bool,
  pending: VecDeque<Pending>,
  builds_issued: u64,
  last_failure: Option<BuildFailure>,
}

impl BuildCoordinator {
  pub fn new(driver: Box<dyn CompilerDriver>, policy: FailurePolicy) -> Self {
    Self {
      driver,
      policy,
      state: BuildState::Invalid,
      building: false,
      force_rebuild: false,
      settle_scheduled: false,
      pending: VecDeque::new(),
      builds_issued: 0,
      last_failure: None,
    }
  }

  pub fn state(&self) -> BuildState {
    self.state
  }

  /// A successful build is waiting for its deferred [`settle`](Self::settle) step.
  pub fn settle_scheduled(&self) -> bool {
    self.settle_scheduled
  }

  pub fn status(&self) -> CoordinatorStatus {
    CoordinatorStatus {
      state: self.state,
      building: self.building,
      pending: self.pending.len(),
      rebuild_requested: self.force_rebuild,
      builds_issued: self.builds_issued,
    }
  }

  /// Issue the initial build.
  pub fn start(&mut self, mode: StartMode) {
    if self.building {
      warn!("pipeline already started, ignoring start request");
      return;
    }
    self.building = true;
    self.builds_issued += 1;

    let result = match &mode {
      StartMode::Once => self.driver.run(),
      StartMode::Watch(options) => self.driver.watch(options),
    };
    info!(watch = matches!(mode, StartMode::Watch(_)), "initial build issued");
    if let Err(e) = result {
      self.driver_failed(e);
    }
  }

  /// Compiler is about to rebuild. Idempotent.
  pub fn mark_invalid(&mut self) {
    self.building = true;
    self.last_failure = None;
    if self.state == BuildState::Invalid {
      return;
    }
    self.state = BuildState::Invalid;
    info!("build invalidated, waiting for recompilation");
  }

  /// Compiler finished successfully. Draining happens later in [`settle`](Self::settle).
  pub fn mark_valid(&mut self, stats: BuildStats) {
    self.building = false;
    self.last_failure = None;
    self.state = BuildState::Valid;
    self.settle_scheduled = true;
    info!(
      outputs = stats.outputs.len(),
      warnings = stats.warnings.len(),
      duration_ms = stats.duration.as_millis() as u64,
      "build complete"
    );
    for warning in &stats.warnings {
      warn!(warning = %warning, "build warning");
    }
  }

  /// Compiler finished with errors. State stays invalid.
  pub fn build_failed(&mut self, stats: BuildStats) {
    self.building = false;
    self.state = BuildState::Invalid;
    for err in &stats.errors {
      error!(error = %err, "build error");
    }
    error!(errors = stats.errors.len(), pending = self.pending.len(), "build failed");

    let failure = BuildFailure { errors: stats.errors };
    if self.policy == FailurePolicy::Reject {
      let mut kept = VecDeque::with_capacity(self.pending.len());
      for pending in self.pending.drain(..) {
        match pending {
          Pending::Waiter(tx) => {
            let _ = tx.send(Err(failure.clone()));
          }
          callback => kept.push_back(callback),
        }
      }
      self.pending = kept;
    }
    self.last_failure = Some(failure);

    // The failed build is no longer in flight, so a requested rebuild can go now.
    if self.force_rebuild {
      self.force_rebuild = false;
      self.issue_rebuild();
    }
  }

  /// Deferred half of [`mark_valid`](Self::mark_valid).
  ///
  /// Runs after every event queued alongside the completion, so an
  /// invalidation that raced the completion leaves the queue untouched.
  pub fn settle(&mut self) {
    self.settle_scheduled = false;
    if self.state != BuildState::Valid {
      debug!(pending = self.pending.len(), "build invalidated before settling, keeping queue");
      return;
    }

    let drained = self.pending.len();
    while let Some(pending) = self.pending.pop_front() {
      pending.fire();
    }
    if drained > 0 {
      debug!(drained, "released waiting callers");
    }

    if self.force_rebuild {
      self.force_rebuild = false;
      info!("running requested rebuild");
      self.state = BuildState::Invalid;
      self.issue_rebuild();
    }
  }

  /// Run `pending` now if the build is valid, otherwise queue it.
  pub fn enqueue(&mut self, pending: Pending) {
    if self.state == BuildState::Valid && !self.settle_scheduled {
      pending.fire();
      return;
    }
    let pending = match (pending, self.standing_failure()) {
      (Pending::Waiter(tx), Some(failure)) => {
        debug!("last build failed and none is running, rejecting waiter");
        let _ = tx.send(Err(failure.clone()));
        return;
      }
      (pending, _) => pending,
    };
    self.pending.retain(|p| !p.is_cancelled());
    self.pending.push_back(pending);
    debug!(pending = self.pending.len(), state = %self.state, "queued caller until build is valid");
  }

  /// Ask for a rebuild without ever running two builds at once.
  pub fn request_rebuild(&mut self) {
    if self.building {
      if !self.force_rebuild {
        debug!("build in flight, rebuild deferred until it completes");
      }
      self.force_rebuild = true;
      return;
    }
    self.state = BuildState::Invalid;
    self.issue_rebuild();
  }

  /// Failure new waiters are rejected with: the last build failed, nothing
  /// is in flight and the policy is [`FailurePolicy::Reject`].
  fn standing_failure(&self) -> Option<&BuildFailure> {
    if self.policy == FailurePolicy::Reject && !self.building {
      self.last_failure.as_ref()
    } else {
      None
    }
  }

  fn issue_rebuild(&mut self) {
    self.building = true;
    self.builds_issued += 1;
    info!(builds_issued = self.builds_issued, "rebuild issued");
    if let Err(e) = self.driver.run() {
      self.driver_failed(e);
    }
  }

  fn driver_failed(&mut self, err: DriverError) {
    self.build_failed(BuildStats::failed(format!("compiler driver failed: {}", err)));
  }
}
