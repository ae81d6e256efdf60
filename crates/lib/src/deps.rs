//! Dependency fingerprints for staleness detection.
//!
//! A [`DependencyInfo`] records the content hash of every file a build read,
//! plus directories to watch for files that should have been read but were
//! not (a newly added source, a new package). It never influences what gets
//! built, only whether a previous build can be trusted.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use walkdir::WalkDir;

use crate::util::hash::{ContentHash, hash_file};

/// A file-name pattern, persisted as its regex source.
#[derive(Debug, Clone)]
pub struct WatchPattern(Regex);

impl WatchPattern {
  pub fn new(pattern: &str) -> Result<Self, regex::Error> {
    Regex::new(pattern).map(Self)
  }

  /// Pattern matching file names ending in `.<extension>`.
  pub fn extension(extension: &str) -> Self {
    Self(Regex::new(&format!(r"\.{}$", regex::escape(extension))).expect("escaped literal pattern is valid"))
  }

  pub fn is_match(&self, name: &str) -> bool {
    self.0.is_match(name)
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }
}

impl PartialEq for WatchPattern {
  fn eq(&self, other: &Self) -> bool {
    self.as_str() == other.as_str()
  }
}

impl Serialize for WatchPattern {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for WatchPattern {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let source = String::deserialize(deserializer)?;
    WatchPattern::new(&source).map_err(serde::de::Error::custom)
  }
}

/// Which file names inside a watched directory matter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryWatch {
  #[serde(default)]
  pub include: Vec<WatchPattern>,
  #[serde(default)]
  pub exclude: Vec<WatchPattern>,
}

impl DirectoryWatch {
  fn includes(&self, name: &str) -> bool {
    self.include.iter().any(|p| p.is_match(name))
  }

  fn excludes(&self, name: &str) -> bool {
    self.exclude.iter().any(|p| p.is_match(name))
  }
}

/// Files and directories a build depends on, keyed by absolute path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
  #[serde(default)]
  pub files: BTreeMap<String, ContentHash>,
  #[serde(default)]
  pub directories: BTreeMap<String, DirectoryWatch>,
}

/// Why a recorded build can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
  /// The artifact was built from a different source tree (e.g. it was copied).
  SourceMismatch { recorded: Option<String>, expected: String },
  FileChanged(String),
  FileMissing(String),
  /// A watched directory holds a file the build never accounted for.
  NewFile(String),
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::SourceMismatch { recorded, expected } => write!(
        f,
        "built from {} rather than {}",
        recorded.as_deref().unwrap_or("an unknown location"),
        expected
      ),
      Self::FileChanged(path) => write!(f, "{} changed", path),
      Self::FileMissing(path) => write!(f, "{} is missing", path),
      Self::NewFile(path) => write!(f, "{} was added", path),
    }
  }
}

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
  UpToDate,
  Stale(StaleReason),
}

impl Freshness {
  pub fn is_up_to_date(&self) -> bool {
    matches!(self, Self::UpToDate)
  }
}

impl DependencyInfo {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record the hash of a file the build read.
  pub fn record_file(&mut self, path: &Path, hash: ContentHash) {
    self.files.insert(path.display().to_string(), hash);
  }

  pub fn watch_directory(&mut self, path: &Path, watch: DirectoryWatch) {
    self.directories.insert(path.display().to_string(), watch);
  }

  /// Fold another record into this one. Entries from `other` win.
  pub fn merge(&mut self, other: &DependencyInfo) {
    self
      .files
      .extend(other.files.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
      .directories
      .extend(other.directories.iter().map(|(k, v)| (k.clone(), v.clone())));
  }

  /// Compare the record against the live filesystem.
  pub fn check(&self) -> Freshness {
    for (path, recorded) in &self.files {
      match hash_file(Path::new(path)) {
        Ok(actual) if &actual == recorded => {}
        Ok(_) => return Freshness::Stale(StaleReason::FileChanged(path.clone())),
        Err(e) => {
          debug!(path = %path, error = %e, "recorded dependency unreadable");
          return Freshness::Stale(StaleReason::FileMissing(path.clone()));
        }
      }
    }

    for (dir, watch) in &self.directories {
      if let Some(path) = self.unaccounted_file(Path::new(dir), watch) {
        return Freshness::Stale(StaleReason::NewFile(path));
      }
    }

    Freshness::UpToDate
  }

  fn unaccounted_file(&self, root: &Path, watch: &DirectoryWatch) -> Option<String> {
    if !root.is_dir() {
      return None;
    }

    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
      e.depth() == 0 || !(e.file_type().is_dir() && watch.excludes(&e.file_name().to_string_lossy()))
    });

    for entry in walker.flatten() {
      if !entry.file_type().is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy();
      if !watch.includes(&name) || watch.excludes(&name) {
        continue;
      }
      let path = entry.path().display().to_string();
      if !self.files.contains_key(&path) {
        return Some(path);
      }
    }

    None
  }
}
