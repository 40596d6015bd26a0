//! In-memory output store.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use super::OutputStore;

/// Output store kept entirely in memory.
///
/// Clones share the same files, so a driver and a resolver can each hold one.
/// Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a store pre-populated with files.
  pub fn with_files<I, P>(files: I) -> Self
  where
    I: IntoIterator<Item = (P, Vec<u8>)>,
    P: AsRef<Path>,
  {
    let store = Self::new();
    {
      let mut map = store.files.write().unwrap_or_else(PoisonError::into_inner);
      for (path, contents) in files {
        map.insert(normalize(path.as_ref()), contents);
      }
    }
    store
  }

  pub fn len(&self) -> usize {
    self.files.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Forward slashes everywhere so lookups don't depend on the host separator.
fn normalize(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

impl OutputStore for MemoryStore {
  async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
    let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
    files
      .get(&normalize(path))
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found in memory store", path.display())))
  }

  fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
    files.insert(normalize(path), contents.to_vec());
    Ok(())
  }
}
