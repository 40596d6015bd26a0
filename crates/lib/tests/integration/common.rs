//! Shared helpers for resolver integration tests.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use kiln_lib::config::{Entry, EntryMap, OutputLayout, OutputMode};
use kiln_lib::coordinator::{Coordinator, CoordinatorStatus, FailurePolicy};
use kiln_lib::driver::{CompilerDriver, DriverError, EventSink, WatchOptions, event_channel};
use kiln_lib::loader::LuaLoader;
use kiln_lib::resolver::Resolver;
use kiln_lib::store::{MemoryStore, OutputStore};

/// Driver that only counts invocations. Tests play the compiler by writing
/// outputs into the store and sending events through the sink.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
  pub runs: Rc<Cell<usize>>,
  pub watches: Rc<Cell<usize>>,
}

impl CompilerDriver for ScriptedDriver {
  fn run(&mut self) -> Result<(), DriverError> {
    self.runs.set(self.runs.get() + 1);
    Ok(())
  }

  fn watch(&mut self, _options: &WatchOptions) -> Result<(), DriverError> {
    self.watches.set(self.watches.get() + 1);
    Ok(())
  }
}

pub struct Harness {
  pub resolver: Resolver<MemoryStore, LuaLoader>,
  pub coordinator: Coordinator,
  pub sink: EventSink,
  pub store: MemoryStore,
  pub driver: ScriptedDriver,
}

impl Harness {
  /// Entries `name -> /src/<name>.lua`, outputs under `/target`.
  ///
  /// Must be called inside a `LocalSet`.
  pub fn new(mode: OutputMode, names: &[&str], policy: FailurePolicy) -> Self {
    let entries: EntryMap = names
      .iter()
      .map(|name| Entry {
        name: name.to_string(),
        source: PathBuf::from(format!("/src/{name}.lua")),
      })
      .collect();
    let layout = OutputLayout::new("/target", mode, None);
    let store = MemoryStore::new();
    let driver = ScriptedDriver::default();

    let (sink, events) = event_channel();
    let (coordinator, _task) = Coordinator::spawn(driver.clone(), events, policy);
    let resolver = Resolver::new(
      coordinator.clone(),
      Arc::new(entries),
      layout,
      store.clone(),
      LuaLoader::new(),
    );

    Self {
      resolver,
      coordinator,
      sink,
      store,
      driver,
    }
  }

  /// Write an output file the way a compiler would.
  pub fn emit(&self, file: &str, code: &str) {
    self
      .store
      .write_file(&PathBuf::from("/target").join(file), code.as_bytes())
      .unwrap();
  }

  /// Two status round trips: the first flushes queued events and commands,
  /// the second observes the state after any deferred settle step.
  pub async fn quiesce(&self) -> CoordinatorStatus {
    self.coordinator.status().await.unwrap();
    self.coordinator.status().await.unwrap()
  }
}
