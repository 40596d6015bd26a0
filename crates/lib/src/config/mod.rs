//! Pipeline configuration.
//!
//! A pipeline is described by a `kiln.json`, `kiln.yaml` or `kiln.yml` file:
//!
//! ```yaml
//! pipeline: server
//! entries:
//!   alpha: src/alpha
//!   beta: { path: src/beta.lua, pipelines: [server] }
//! output:
//!   dir: target
//!   mode: single
//!   filename: "[name].lua"
//!   store: disk
//! resolve:
//!   extensions: [".lua"]
//! failure_policy: stall
//! watch:
//!   debounce_ms: 100
//! loader:
//!   sandbox: full
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.
//!
//! # Submodules
//!
//! - [`entries`] - Entry map assembly (pipeline filter, extension search)
//! - [`output`] - Output layout (where each artifact is written)

pub mod entries;
pub mod output;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::coordinator::FailurePolicy;
use crate::driver::WatchOptions;
use crate::loader::Sandbox;
use crate::store::StoreKind;

pub use entries::{Entry, EntryMap};
pub use output::{NAME_PLACEHOLDER, OutputLayout, OutputMode};

/// Config file names probed by [`Config::discover`], in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["kiln.json", "kiln.yaml", "kiln.yml"];

/// Errors raised while loading configuration or assembling entries.
///
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {message}", path.display())]
  Parse { path: PathBuf, message: String },

  #[error("unsupported config format: {} (expected .json, .yaml or .yml)", .0.display())]
  UnsupportedFormat(PathBuf),

  /// The output section names a convention the pipeline cannot produce.
  #[error("unsupported output configuration: {0}")]
  UnsupportedOutput(String),

  #[error("entry '{name}' not found at {}", path.display())]
  EntryNotFound { name: String, path: PathBuf },

  #[error("no entries participate in pipeline {pipeline:?}")]
  NoEntries { pipeline: Option<String> },
}

/// Parsed pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// Pipeline tag. Entries tagged for other pipelines are skipped.
  #[serde(default)]
  pub pipeline: Option<String>,

  pub entries: BTreeMap<String, EntryDecl>,

  pub output: OutputConfig,

  #[serde(default)]
  pub resolve: ResolveConfig,

  #[serde(default)]
  pub failure_policy: FailurePolicy,

  #[serde(default)]
  pub watch: WatchConfig,

  #[serde(default)]
  pub loader: LoaderConfig,

  /// Directory relative paths are resolved against.
  #[serde(skip)]
  pub base_dir: PathBuf,
}

/// An entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntryDecl {
  /// `alpha: src/alpha`
  Path(PathBuf),
  /// `alpha: { path: src/alpha, pipelines: [server] }`
  Detailed {
    path: PathBuf,
    #[serde(default)]
    pipelines: Vec<String>,
  },
}

impl EntryDecl {
  pub fn path(&self) -> &Path {
    match self {
      EntryDecl::Path(path) => path,
      EntryDecl::Detailed { path, .. } => path,
    }
  }

  /// Untagged entries take part in every pipeline.
  pub fn participates_in(&self, pipeline: Option<&str>) -> bool {
    match (self, pipeline) {
      (EntryDecl::Path(_), _) => true,
      (EntryDecl::Detailed { pipelines, .. }, _) if pipelines.is_empty() => true,
      (EntryDecl::Detailed { .. }, None) => true,
      (EntryDecl::Detailed { pipelines, .. }, Some(tag)) => pipelines.iter().any(|p| p == tag),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
  pub dir: PathBuf,
  #[serde(default)]
  pub mode: OutputMode,
  /// File name template. Defaults to `[name].lua` (single) or `bundle.lua` (combined).
  #[serde(default)]
  pub filename: Option<String>,
  #[serde(default)]
  pub store: StoreKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
  /// Extensions tried, in order, for entry paths given without one.
  #[serde(default = "default_extensions")]
  pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
  fn default() -> Self {
    Self {
      extensions: default_extensions(),
    }
  }
}

fn default_extensions() -> Vec<String> {
  vec![".lua".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

fn default_debounce_ms() -> u64 {
  100
}

impl WatchConfig {
  pub fn options(&self) -> WatchOptions {
    WatchOptions {
      debounce: Duration::from_millis(self.debounce_ms),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
  #[serde(default)]
  pub sandbox: Sandbox,
}

impl Config {
  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let base_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or(Path::new("."));
    let base_dir = dunce::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());

    let mut config = match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Self::from_json(&source),
      Some("yaml") | Some("yml") => Self::from_yaml(&source),
      _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
    .map_err(|message| ConfigError::Parse {
      path: path.to_path_buf(),
      message,
    })?;

    config.base_dir = base_dir;
    config.validate()?;
    debug!(path = %path.display(), entries = config.entries.len(), "loaded config");
    Ok(config)
  }

  /// Find a config file in `dir`, trying [`CONFIG_FILE_NAMES`] in order.
  pub fn discover(dir: &Path) -> Result<PathBuf, ConfigError> {
    CONFIG_FILE_NAMES
      .iter()
      .map(|name| dir.join(name))
      .find(|candidate| candidate.is_file())
      .ok_or_else(|| ConfigError::NotFound(dir.join(CONFIG_FILE_NAMES[0])))
  }

  fn from_json(source: &str) -> Result<Self, String> {
    serde_json::from_str(source).map_err(|e| e.to_string())
  }

  fn from_yaml(source: &str) -> Result<Self, String> {
    serde_yaml::from_str(source).map_err(|e| e.to_string())
  }

  /// Check structural constraints serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(template) = &self.output.filename {
      let has_placeholder = template.contains(NAME_PLACEHOLDER);
      match self.output.mode {
        OutputMode::Single if !has_placeholder => {
          return Err(ConfigError::UnsupportedOutput(format!(
            "single output mode needs '{}' in the filename template, got '{}'",
            NAME_PLACEHOLDER, template
          )));
        }
        OutputMode::Combined if has_placeholder => {
          return Err(ConfigError::UnsupportedOutput(format!(
            "combined output mode writes one file; '{}' is not allowed in '{}'",
            NAME_PLACEHOLDER, template
          )));
        }
        _ => {}
      }
      if template.is_empty() || template.ends_with('/') {
        return Err(ConfigError::UnsupportedOutput(format!(
          "invalid filename template '{}'",
          template
        )));
      }
    }

    if let Some(ext) = self.resolve.extensions.iter().find(|e| !e.starts_with('.')) {
      return Err(ConfigError::UnsupportedOutput(format!(
        "resolve extensions must start with '.', got '{}'",
        ext
      )));
    }

    Ok(())
  }

  /// Output layout with the output directory made absolute.
  pub fn layout(&self) -> OutputLayout {
    let dir = if self.output.dir.is_absolute() {
      self.output.dir.clone()
    } else {
      self.base_dir.join(&self.output.dir)
    };
    OutputLayout::new(dir, self.output.mode, self.output.filename.clone())
  }
}
