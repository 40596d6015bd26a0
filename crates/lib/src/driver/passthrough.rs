//! Passthrough compiler.
//!
//! Copies each entry's source to its output file (single mode) or wraps all
//! entries into one bundle returning `{ [name] = exports }` (combined mode).
//! Every source is syntax-checked first; a build with errors writes nothing,
//! so the store keeps the last good output.
//!
//! Builds run on a background thread and are serialized: a `run()` issued
//! while a watch rebuild is in progress waits for it.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use mlua::Lua;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use super::{CompilerDriver, DriverError, EventSink, WatchOptions};
use crate::config::{EntryMap, OutputLayout, OutputMode};
use crate::coordinator::BuildStats;
use crate::store::OutputStore;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Driver that builds by copying or bundling Lua sources.
pub struct PassthroughCompiler<S: OutputStore> {
  builder: Arc<Mutex<Builder<S>>>,
  sink: EventSink,
  watcher: Option<RecommendedWatcher>,
  running: Arc<AtomicBool>,
}

impl<S: OutputStore> PassthroughCompiler<S> {
  pub fn new(entries: Arc<EntryMap>, layout: OutputLayout, store: S, sink: EventSink) -> Self {
    Self {
      builder: Arc::new(Mutex::new(Builder { entries, layout, store })),
      sink,
      watcher: None,
      running: Arc::new(AtomicBool::new(true)),
    }
  }

  /// Build synchronously on the calling thread without emitting events.
  pub fn build_now(&self) -> BuildStats {
    lock(&self.builder).build()
  }

  pub fn is_watching(&self) -> bool {
    self.watcher.is_some()
  }
}

impl<S: OutputStore> CompilerDriver for PassthroughCompiler<S> {
  fn run(&mut self) -> Result<(), DriverError> {
    let builder = Arc::clone(&self.builder);
    let sink = self.sink.clone();

    thread::Builder::new()
      .name("kiln-build".to_string())
      .spawn(move || build_and_report(&builder, &sink))
      .map_err(DriverError::Spawn)?;
    Ok(())
  }

  fn watch(&mut self, options: &WatchOptions) -> Result<(), DriverError> {
    if self.watcher.is_some() {
      debug!("already watching");
      return Ok(());
    }

    let (dirs, output_dir) = {
      let builder = lock(&self.builder);
      (builder.entries.source_dirs(), builder.layout.dir().to_path_buf())
    };

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
      move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
          if matches!(event.kind, EventKind::Access(_)) {
            return;
          }
          for path in event.paths {
            if !path.starts_with(&output_dir) {
              let _ = tx.send(path);
            }
          }
        }
        Err(e) => warn!(error = %e, "file watcher error"),
      },
      notify::Config::default(),
    )?;

    for dir in &dirs {
      watcher.watch(dir, RecursiveMode::NonRecursive)?;
      debug!(dir = %dir.display(), "watching");
    }

    let builder = Arc::clone(&self.builder);
    let sink = self.sink.clone();
    let running = Arc::clone(&self.running);
    let debounce = options.debounce;

    thread::Builder::new()
      .name("kiln-watch".to_string())
      .spawn(move || {
        build_and_report(&builder, &sink);
        watch_loop(&builder, &sink, &running, &rx, debounce);
        debug!("watch loop stopped");
      })
      .map_err(DriverError::Spawn)?;

    info!(dirs = dirs.len(), debounce_ms = debounce.as_millis() as u64, "watch started");
    self.watcher = Some(watcher);
    Ok(())
  }
}

impl<S: OutputStore> Drop for PassthroughCompiler<S> {
  fn drop(&mut self) {
    self.running.store(false, Ordering::SeqCst);
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build and report. The lock is held until `Done` is sent, so the
/// coordinator never sees two `BuildStarting`/`Done` pairs interleave.
fn build_and_report<S: OutputStore>(builder: &Mutex<Builder<S>>, sink: &EventSink) {
  let guard = lock(builder);
  sink.build_starting();
  let stats = guard.build();
  sink.done(stats);
  drop(guard);
}

fn watch_loop<S: OutputStore>(
  builder: &Mutex<Builder<S>>,
  sink: &EventSink,
  running: &AtomicBool,
  rx: &mpsc::Receiver<PathBuf>,
  debounce: Duration,
) {
  let mut state = WatchState::default();

  while running.load(Ordering::SeqCst) && !sink.is_closed() {
    match rx.recv_timeout(POLL_INTERVAL) {
      Ok(path) => {
        trace!(path = %path.display(), "source changed");
        if state.add_change(path) {
          sink.invalid();
        }
      }
      Err(RecvTimeoutError::Timeout) => {}
      Err(RecvTimeoutError::Disconnected) => break,
    }

    if state.should_sync(debounce) {
      let changes = state.take_changes();
      info!(changed = changes.len(), "rebuilding");
      build_and_report(builder, sink);
    }
  }
}

/// Debounce state for the watch loop.
#[derive(Debug, Default)]
struct WatchState {
  pending: BTreeSet<PathBuf>,
  last_change: Option<Instant>,
}

impl WatchState {
  /// Record a change. Returns true if it opened a new debounce window.
  fn add_change(&mut self, path: PathBuf) -> bool {
    let opened = self.pending.is_empty();
    self.pending.insert(path);
    self.last_change = Some(Instant::now());
    opened
  }

  fn should_sync(&self, debounce: Duration) -> bool {
    match self.last_change {
      Some(last) => !self.pending.is_empty() && last.elapsed() >= debounce,
      None => false,
    }
  }

  fn take_changes(&mut self) -> Vec<PathBuf> {
    self.last_change = None;
    std::mem::take(&mut self.pending).into_iter().collect()
  }
}

struct Builder<S> {
  entries: Arc<EntryMap>,
  layout: OutputLayout,
  store: S,
}

impl<S: OutputStore> Builder<S> {
  fn build(&self) -> BuildStats {
    let started = Instant::now();
    let mut stats = BuildStats::default();

    let mut sources = Vec::with_capacity(self.entries.len());
    for entry in self.entries.iter() {
      match std::fs::read_to_string(&entry.source) {
        Ok(source) => {
          if let Err(message) = check_syntax(&source, &entry.source) {
            stats.errors.push(format!("{}: {}", entry.name, message));
          } else {
            if source.trim().is_empty() {
              stats.warnings.push(format!("{}: source is empty", entry.name));
            }
            sources.push((entry.name.as_str(), source));
          }
        }
        Err(e) => stats
          .errors
          .push(format!("{}: failed to read {}: {}", entry.name, entry.source.display(), e)),
      }
    }

    if stats.has_errors() {
      stats.duration = started.elapsed();
      warn!(errors = stats.errors.len(), "build failed");
      return stats;
    }

    let outputs = match self.layout.mode() {
      OutputMode::Single => sources
        .iter()
        .map(|(name, source)| (self.layout.output_path(name), source.clone()))
        .collect::<Vec<_>>(),
      OutputMode::Combined => vec![(self.layout.bundle_path(), bundle(&sources))],
    };

    for (path, contents) in outputs {
      match self.store.write_file(&path, contents.as_bytes()) {
        Ok(()) => stats.outputs.push(path),
        Err(e) => stats.errors.push(format!("failed to write {}: {}", path.display(), e)),
      }
    }

    stats.duration = started.elapsed();
    debug!(
      outputs = stats.outputs.len(),
      errors = stats.errors.len(),
      duration_ms = stats.duration.as_millis() as u64,
      "build finished"
    );
    stats
  }
}

/// Compile `source` in a scratch state without running it.
fn check_syntax(source: &str, path: &Path) -> Result<(), String> {
  let lua = Lua::new();
  lua
    .load(source)
    .set_name(format!("@{}", path.display()))
    .into_function()
    .map(|_| ())
    .map_err(|e| e.to_string())
}

/// Wrap every entry in its own function scope and return them keyed by name.
fn bundle(sources: &[(&str, String)]) -> String {
  let mut out = String::from("local __modules = {}\n");
  for (name, source) in sources {
    let _ = write!(
      out,
      "__modules[{name:?}] = (function()\n\
       local module = {{ exports = {{}} }}\n\
       local exports = module.exports\n\
       local __ret = (function()\n{source}\nend)()\n\
       if __ret ~= nil then return __ret end\n\
       return module.exports\n\
       end)()\n"
    );
  }
  out.push_str("return __modules\n");
  out
}
