//! Entry map assembly.
//!
//! The entry map is built once at startup and never changes afterwards. An
//! entry path is looked up in this order:
//!
//! 1. the path as written, if it is a file
//! 2. the path with each configured extension appended
//! 3. `init` plus each extension inside the path, if it is a directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{Config, ConfigError};

/// A named source module the compiler builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub name: String,
  /// Absolute path of the source file.
  pub source: PathBuf,
}

/// Immutable mapping of entry names to source files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMap {
  entries: BTreeMap<String, Entry>,
}

impl EntryMap {
  /// Resolve the entries of `config` that take part in its pipeline.
  pub fn assemble(config: &Config) -> Result<Self, ConfigError> {
    let pipeline = config.pipeline.as_deref();
    let mut entries = BTreeMap::new();

    for (name, decl) in &config.entries {
      if !decl.participates_in(pipeline) {
        trace!(entry = %name, ?pipeline, "entry skipped for pipeline");
        continue;
      }

      let declared = if decl.path().is_absolute() {
        decl.path().to_path_buf()
      } else {
        config.base_dir.join(decl.path())
      };

      let source = find_source(&declared, &config.resolve.extensions).ok_or_else(|| ConfigError::EntryNotFound {
        name: name.clone(),
        path: declared.clone(),
      })?;
      let source = dunce::canonicalize(&source).unwrap_or(source);

      debug!(entry = %name, source = %source.display(), "resolved entry");
      entries.insert(
        name.clone(),
        Entry {
          name: name.clone(),
          source,
        },
      );
    }

    if entries.is_empty() {
      return Err(ConfigError::NoEntries {
        pipeline: config.pipeline.clone(),
      });
    }

    Ok(Self { entries })
  }

  pub fn get(&self, name: &str) -> Option<&Entry> {
    self.entries.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Entry> {
    self.entries.values()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Distinct parent directories of all sources, for file watching.
  pub fn source_dirs(&self) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = self
      .iter()
      .filter_map(|entry| entry.source.parent().map(Path::to_path_buf))
      .collect();
    dirs.sort();
    dirs.dedup();
    dirs
  }
}

impl FromIterator<Entry> for EntryMap {
  fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
    Self {
      entries: iter.into_iter().map(|entry| (entry.name.clone(), entry)).collect(),
    }
  }
}

fn find_source(declared: &Path, extensions: &[String]) -> Option<PathBuf> {
  if declared.is_file() {
    return Some(declared.to_path_buf());
  }

  for ext in extensions {
    let mut candidate = declared.as_os_str().to_owned();
    candidate.push(ext);
    let candidate = PathBuf::from(candidate);
    if candidate.is_file() {
      return Some(candidate);
    }
  }

  if declared.is_dir() {
    for ext in extensions {
      let candidate = declared.join(format!("init{ext}"));
      if candidate.is_file() {
        return Some(candidate);
      }
    }
  }

  None
}
