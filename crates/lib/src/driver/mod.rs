//! Compiler driver interface.
//!
//! The coordinator treats the compiler as an opaque driver with two entry
//! points, [`CompilerDriver::run`] and [`CompilerDriver::watch`]. Drivers report
//! progress by sending [`BuildEvent`]s through an [`EventSink`]; the coordinator
//! consumes the matching [`EventStream`].
//!
//! # Submodules
//!
//! - [`passthrough`] - Minimal driver that copies or bundles Lua sources

pub mod passthrough;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::coordinator::{BuildEvent, BuildStats};

pub use passthrough::PassthroughCompiler;

/// Errors raised while starting a build or a watch.
#[derive(Debug, Error)]
pub enum DriverError {
  /// The file watcher could not be created or attached.
  #[error("watch error: {0}")]
  Watch(#[from] notify::Error),

  /// The background build thread could not be spawned.
  #[error("failed to spawn build thread: {0}")]
  Spawn(std::io::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Options for the driver's watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
  /// Quiet period after the last change before a rebuild starts.
  pub debounce: Duration,
}

impl Default for WatchOptions {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(100),
    }
  }
}

/// A compiler the coordinator can drive.
///
/// Implementations must return quickly: the build itself happens elsewhere and
/// is reported through the driver's [`EventSink`].
pub trait CompilerDriver {
  /// Start a single build.
  fn run(&mut self) -> Result<(), DriverError>;

  /// Build now and keep rebuilding when sources change.
  fn watch(&mut self, options: &WatchOptions) -> Result<(), DriverError>;
}

/// Sending half of the compiler event channel. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct EventSink {
  tx: mpsc::UnboundedSender<BuildEvent>,
}

impl EventSink {
  pub fn invalid(&self) {
    self.send(BuildEvent::Invalid);
  }

  pub fn build_starting(&self) {
    self.send(BuildEvent::BuildStarting);
  }

  pub fn done(&self, stats: BuildStats) {
    self.send(BuildEvent::Done(stats));
  }

  /// The coordinator has stopped listening.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  fn send(&self, event: BuildEvent) {
    // A closed channel means the pipeline shut down; late events are moot.
    let _ = self.tx.send(event);
  }
}

/// Receiving half of the compiler event channel, consumed by the coordinator.
#[derive(Debug)]
pub struct EventStream {
  rx: mpsc::UnboundedReceiver<BuildEvent>,
}

impl EventStream {
  pub async fn recv(&mut self) -> Option<BuildEvent> {
    self.rx.recv().await
  }
}

/// Create a connected sink/stream pair.
pub fn event_channel() -> (EventSink, EventStream) {
  let (tx, rx) = mpsc::unbounded_channel();
  (EventSink { tx }, EventStream { rx })
}
