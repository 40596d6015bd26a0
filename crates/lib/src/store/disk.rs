//! Filesystem-backed output store.

use std::fs;
use std::io;
use std::path::Path;

use tracing::trace;

use super::OutputStore;

/// Output store writing to the local filesystem. Paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct DiskStore;

impl DiskStore {
  pub fn new() -> Self {
    Self
  }
}

impl OutputStore for DiskStore {
  async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
    tokio::fs::read(path).await
  }

  fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    trace!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(())
  }
}
