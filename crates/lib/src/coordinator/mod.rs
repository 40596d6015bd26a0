//! Build-state coordination.
//!
//! The coordinator sits between a compiler driver and the callers that want
//! compiled artifacts. It:
//! - tracks whether the compiled output is currently valid
//! - queues callers while a build is in flight and releases them in order
//! - coalesces rebuild requests so at most one build runs at a time
//!
//! [`Coordinator`] is a cloneable handle to a single task, spawned on the
//! current [`LocalSet`](tokio::task::LocalSet), that owns a [`BuildCoordinator`]
//! and is the only writer of its state. Compiler events are always handled
//! before caller commands, and the deferred drain after a successful build runs
//! only once both channels are empty, so a completion immediately followed by
//! an invalidation never releases callers against stale output.
//!
//! # Submodules
//!
//! - [`state`] - The synchronous state machine
//! - [`types`] - Events, stats, policies and status snapshots

pub mod state;
pub mod types;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::{CompilerDriver, EventStream};

pub use state::{BuildCoordinator, Pending};
pub use types::{
  BuildEvent, BuildFailure, BuildState, BuildStats, CoordinatorStatus, FailurePolicy, StartMode, WaitError,
};

enum Command {
  Start(StartMode),
  Await(Pending),
  RequestRebuild,
  Status(oneshot::Sender<CoordinatorStatus>),
}

/// Handle to a running coordinator task.
#[derive(Clone)]
pub struct Coordinator {
  commands: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
  /// Spawn the coordinator task on the current `LocalSet`.
  ///
  /// The task runs until every handle has been dropped.
  ///
  /// # Panics
  ///
  /// Panics if called outside of a `LocalSet`.
  pub fn spawn<D>(driver: D, events: EventStream, policy: FailurePolicy) -> (Self, JoinHandle<()>)
  where
    D: CompilerDriver + 'static,
  {
    let machine = BuildCoordinator::new(Box::new(driver), policy);
    let (tx, rx) = mpsc::unbounded_channel();
    // Budget-forced yields would let the settle branch overtake a ready event.
    let task = tokio::task::spawn_local(tokio::task::unconstrained(drive(machine, events, rx)));
    (Self { commands: tx }, task)
  }

  /// Issue the initial build.
  pub fn start(&self, mode: StartMode) {
    self.send(Command::Start(mode));
  }

  /// Run `callback` once the output is valid; immediately if it already is.
  ///
  /// Callbacks run on the coordinator task. One that panics is logged and
  /// skipped; the remaining callers are still released.
  pub fn when_ready(&self, callback: impl FnOnce() + 'static) {
    self.send(Command::Await(Pending::Callback(Box::new(callback))));
  }

  /// Wait until the output is valid.
  ///
  /// Dropping the returned future cancels the wait.
  pub async fn wait_ready(&self) -> Result<(), WaitError> {
    let (tx, rx) = oneshot::channel();
    if self.commands.send(Command::Await(Pending::Waiter(tx))).is_err() {
      return Err(WaitError::Closed);
    }
    match rx.await {
      Ok(Ok(())) => Ok(()),
      Ok(Err(failure)) => Err(WaitError::BuildFailed(failure)),
      Err(_) => Err(WaitError::Closed),
    }
  }

  /// Ask for a rebuild. Requests made while a build runs collapse into one.
  pub fn request_rebuild(&self) {
    self.send(Command::RequestRebuild);
  }

  pub async fn status(&self) -> Result<CoordinatorStatus, WaitError> {
    let (tx, rx) = oneshot::channel();
    if self.commands.send(Command::Status(tx)).is_err() {
      return Err(WaitError::Closed);
    }
    rx.await.map_err(|_| WaitError::Closed)
  }

  fn send(&self, command: Command) {
    if self.commands.send(command).is_err() {
      warn!("coordinator is no longer running, dropping command");
    }
  }
}

async fn drive(
  mut machine: BuildCoordinator,
  mut events: EventStream,
  mut commands: mpsc::UnboundedReceiver<Command>,
) {
  let mut events_open = true;

  loop {
    tokio::select! {
      biased;

      event = events.recv(), if events_open => match event {
        Some(event) => handle_event(&mut machine, event),
        None => {
          debug!("compiler event stream closed");
          events_open = false;
        }
      },

      command = commands.recv() => match command {
        Some(command) => handle_command(&mut machine, command),
        None => break,
      },

      _ = std::future::ready(()), if machine.settle_scheduled() => machine.settle(),
    }
  }

  debug!(status = ?machine.status(), "coordinator stopped");
}

fn handle_event(machine: &mut BuildCoordinator, event: BuildEvent) {
  match event {
    BuildEvent::Invalid | BuildEvent::BuildStarting => machine.mark_invalid(),
    BuildEvent::Done(stats) if stats.has_errors() => machine.build_failed(stats),
    BuildEvent::Done(stats) => machine.mark_valid(stats),
  }
}

fn handle_command(machine: &mut BuildCoordinator, command: Command) {
  match command {
    Command::Start(mode) => machine.start(mode),
    Command::Await(pending) => machine.enqueue(pending),
    Command::RequestRebuild => machine.request_rebuild(),
    Command::Status(reply) => {
      let _ = reply.send(machine.status());
    }
  }
}
