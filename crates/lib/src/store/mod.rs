//! Output stores: where compiled artifacts live.
//!
//! Drivers write build outputs through [`OutputStore::write_file`]; the
//! resolver reads them back with [`OutputStore::read_file`]. Reads are a single
//! attempt with no retry.
//!
//! # Submodules
//!
//! - [`disk`] - Persistent store on the local filesystem
//! - [`memory`] - Non-persistent in-memory store

pub mod disk;
pub mod memory;

use std::io;
use std::path::Path;

use serde::Deserialize;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Backing storage for compiled output.
#[allow(async_fn_in_trait)]
pub trait OutputStore: Clone + Send + Sync + 'static {
  /// Read the full contents of `path`.
  async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

  /// Create or replace `path` with `contents`.
  fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Which store a pipeline should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
  #[default]
  Disk,
  Memory,
}

/// A store selected at runtime from configuration.
#[derive(Debug, Clone)]
pub enum Store {
  Disk(DiskStore),
  Memory(MemoryStore),
}

impl Store {
  pub fn new(kind: StoreKind) -> Self {
    match kind {
      StoreKind::Disk => Store::Disk(DiskStore::new()),
      StoreKind::Memory => Store::Memory(MemoryStore::new()),
    }
  }

  pub fn kind(&self) -> StoreKind {
    match self {
      Store::Disk(_) => StoreKind::Disk,
      Store::Memory(_) => StoreKind::Memory,
    }
  }
}

impl OutputStore for Store {
  async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
    match self {
      Store::Disk(store) => store.read_file(path).await,
      Store::Memory(store) => store.read_file(path).await,
    }
  }

  fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    match self {
      Store::Disk(store) => store.write_file(path, contents),
      Store::Memory(store) => store.write_file(path, contents),
    }
  }
}
