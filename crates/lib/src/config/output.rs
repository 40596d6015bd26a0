//! Output layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the entry name in filename templates.
pub const NAME_PLACEHOLDER: &str = "[name]";

const SINGLE_DEFAULT: &str = "[name].lua";
const COMBINED_DEFAULT: &str = "bundle.lua";

/// How compiled entries map to output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
  /// One output file per entry.
  #[default]
  Single,
  /// All entries in one file returning a table keyed by entry name.
  Combined,
}

/// Where the compiler writes each artifact and where the resolver reads it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  dir: PathBuf,
  mode: OutputMode,
  filename: String,
}

impl OutputLayout {
  pub fn new(dir: impl Into<PathBuf>, mode: OutputMode, filename: Option<String>) -> Self {
    let filename = filename.unwrap_or_else(|| match mode {
      OutputMode::Single => SINGLE_DEFAULT.to_string(),
      OutputMode::Combined => COMBINED_DEFAULT.to_string(),
    });
    Self {
      dir: dir.into(),
      mode,
      filename,
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn mode(&self) -> OutputMode {
    self.mode
  }

  /// Output file holding the artifact for `name`.
  pub fn output_path(&self, name: &str) -> PathBuf {
    self.dir.join(self.filename.replace(NAME_PLACEHOLDER, name))
  }

  /// The single output file of a combined build.
  pub fn bundle_path(&self) -> PathBuf {
    self.dir.join(&self.filename)
  }
}
