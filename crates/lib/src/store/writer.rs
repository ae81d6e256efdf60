//! Staged directory writer.
//!
//! Everything is written into a temporary sibling of the target and renamed
//! into place by [`ArtifactBuilder::complete`]. Dropping the builder without
//! completing removes the staging directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::ArtifactError;

pub struct ArtifactBuilder {
  target: PathBuf,
  staging: TempDir,
  reserved: BTreeSet<String>,
}

impl ArtifactBuilder {
  pub fn new(target: &Path) -> Result<Self, ArtifactError> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let write_err = |source| ArtifactError::Write {
      path: parent.to_path_buf(),
      source,
    };
    fs::create_dir_all(parent).map_err(write_err)?;
    let staging = tempfile::Builder::new()
      .prefix(".unibuild-staging-")
      .tempdir_in(parent)
      .map_err(write_err)?;

    Ok(Self {
      target: target.to_path_buf(),
      staging,
      reserved: BTreeSet::new(),
    })
  }

  /// Reserve a relative path that has not been handed out yet, adding a
  /// `~N` suffix before the extension when needed.
  pub fn generate_filename(&mut self, wanted: &str) -> String {
    if self.reserved.insert(wanted.to_string()) {
      return wanted.to_string();
    }

    let (stem, ext) = split_extension(wanted);
    let mut n = 1;
    loop {
      let candidate = format!("{}~{}{}", stem, n, ext);
      if self.reserved.insert(candidate.clone()) {
        return candidate;
      }
      n += 1;
    }
  }

  pub fn write(&self, relative: &str, data: &[u8]) -> Result<(), ArtifactError> {
    let path = self.staging.path().join(relative);
    let write_err = |source| ArtifactError::Write {
      path: path.clone(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(&path, data).map_err(write_err)
  }

  pub fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<(), ArtifactError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Serialize {
      what: relative.to_string(),
      source,
    })?;
    self.write(relative, &json)
  }

  /// Copy the directory tree at `from` to `relative`.
  pub fn copy_directory(&self, from: &Path, relative: &str) -> Result<(), ArtifactError> {
    let destination = self.staging.path().join(relative);
    for entry in WalkDir::new(from).sort_by_file_name() {
      let entry = entry.map_err(|e| ArtifactError::Read {
        path: from.to_path_buf(),
        source: e.into(),
      })?;
      let Ok(suffix) = entry.path().strip_prefix(from) else {
        continue;
      };
      let to = destination.join(suffix);
      let write_err = |source| ArtifactError::Write { path: to.clone(), source };
      if entry.file_type().is_dir() {
        fs::create_dir_all(&to).map_err(write_err)?;
      } else if entry.file_type().is_file() {
        fs::copy(entry.path(), &to).map_err(write_err)?;
      }
    }
    Ok(())
  }

  /// Replace the target with the staged tree.
  pub fn complete(self) -> Result<PathBuf, ArtifactError> {
    let write_err = |source| ArtifactError::Write {
      path: self.target.clone(),
      source,
    };
    if self.target.exists() {
      fs::remove_dir_all(&self.target).map_err(write_err)?;
    }
    fs::rename(self.staging.path(), &self.target).map_err(write_err)?;
    Ok(self.target.clone())
  }
}

fn split_extension(path: &str) -> (&str, &str) {
  let name_start = path.rfind('/').map_or(0, |i| i + 1);
  match path[name_start..].rfind('.') {
    Some(dot) if dot > 0 => path.split_at(name_start + dot),
    _ => (path, ""),
  }
}
