//! The set of packages visible to one build.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::consts::{BUILD_DIR, PACKAGE_DESCRIPTOR, UNIPACKAGE_FILE};
use crate::env::BuildEnv;
use crate::error::{ArtifactError, ConfigError, ResolutionError, Result};
use crate::package::Package;
use crate::slice::{SliceRef, UseSpec};
use crate::store::{self, LoadOptions, SaveOptions};

/// Packages by name, plus the configuration they were materialized with.
///
/// Packages are added with `&mut self` and read with `&self`, so the set is
/// fixed for the duration of any compile or link.
#[derive(Debug)]
pub struct Library {
  env: BuildEnv,
  packages: BTreeMap<String, Arc<Package>>,
  /// Packages materialized from source in this pass, with their source roots.
  built_from_source: Vec<(String, PathBuf)>,
}

impl Library {
  pub fn new(env: BuildEnv) -> Self {
    Self {
      env,
      packages: BTreeMap::new(),
      built_from_source: Vec::new(),
    }
  }

  pub fn env(&self) -> &BuildEnv {
    &self.env
  }

  /// Register a materialized package, replacing any package of the same name.
  ///
  /// The application has no name and cannot be registered.
  pub fn add(&mut self, package: Package) -> Option<Arc<Package>> {
    let name = package.name.clone()?;
    let package = Arc::new(package);
    self.packages.insert(name, package.clone());
    Some(package)
  }

  pub fn get(&self, name: &str) -> std::result::Result<Arc<Package>, ResolutionError> {
    self
      .packages
      .get(name)
      .cloned()
      .ok_or_else(|| ResolutionError::UnknownPackage(name.to_string()))
  }

  pub fn package_names(&self) -> impl Iterator<Item = &str> {
    self.packages.keys().map(String::as_str)
  }

  /// Slices a use of `spec` resolves to on `arch`: the named slice, or the
  /// package's default slices.
  pub fn get_slices(&self, spec: &UseSpec, arch: &str) -> Result<Vec<SliceRef>> {
    let package = self.get(&spec.package)?;
    let indices = match &spec.slice {
      Some(slice) => vec![package.slice_index(slice, arch)?],
      None => package.default_slice_indices(arch)?,
    };
    Ok(indices.into_iter().map(|index| SliceRef::new(package.clone(), index)).collect())
  }

  /// Slices holding a package's tests for `arch`.
  pub fn get_test_slices(&self, name: &str, arch: &str) -> Result<Vec<SliceRef>> {
    let package = self.get(name)?;
    let indices = package.test_slice_indices(arch)?;
    Ok(indices.into_iter().map(|index| SliceRef::new(package.clone(), index)).collect())
  }

  /// Load the package in `dir`, reusing `<dir>/.build` when it is up to date.
  pub fn load_package(&mut self, name: &str, dir: &Path) -> Result<Arc<Package>> {
    let root = dunce::canonicalize(dir).map_err(|_| ConfigError::PackageNotFound {
      name: name.to_string(),
      path: dir.to_path_buf(),
    })?;

    let build_dir = root.join(BUILD_DIR);
    if build_dir.join(UNIPACKAGE_FILE).is_file() {
      let options = LoadOptions {
        only_if_up_to_date: true,
        build_of_path: Some(&root),
      };
      match store::load(name, &build_dir, &self.env.catalog, options) {
        Ok(Some(package)) => {
          info!(package = %name, path = ?build_dir, "using cached build");
          return self.insert(name, package);
        }
        Ok(None) => info!(package = %name, "cached build is stale, rebuilding from source"),
        Err(e) => warn!(package = %name, error = %e, "discarding unreadable cached build"),
      }
    }

    let package = Package::from_directory(name, &root, &self.env)?;
    self.built_from_source.push((name.to_string(), root));
    self.insert(name, package)
  }

  /// Load every immediate subdirectory of `dir` holding a `package.json`.
  /// Returns the loaded names in sorted order.
  pub fn load_tree(&mut self, dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::ReadDescriptor {
      path: dir.to_path_buf(),
      source,
    })?;

    let mut candidates: Vec<(String, PathBuf)> = entries
      .flatten()
      .filter(|entry| entry.path().join(PACKAGE_DESCRIPTOR).is_file())
      .filter_map(|entry| Some((entry.file_name().to_str()?.to_string(), entry.path())))
      .collect();
    candidates.sort();

    let mut loaded = Vec::with_capacity(candidates.len());
    for (name, path) in candidates {
      self.load_package(&name, &path)?;
      loaded.push(name);
    }
    Ok(loaded)
  }

  /// Write a fresh `.build` for every package built from source in this pass.
  ///
  /// Packages that cannot be saved are skipped with a warning. Returns the
  /// artifact directories written.
  pub fn save_built(&self) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (name, root) in &self.built_from_source {
      let package = self.get(name)?;
      if !package.can_be_saved_as_unipackage() {
        warn!(package = %name, "{}", ArtifactError::CannotSave(name.clone()));
        continue;
      }
      let target = root.join(BUILD_DIR);
      store::save(
        &package,
        self,
        &target,
        SaveOptions {
          build_of_path: Some(root),
        },
      )?;
      written.push(target);
    }
    Ok(written)
  }

  fn insert(&mut self, name: &str, package: Package) -> Result<Arc<Package>> {
    let package = Arc::new(package);
    self.packages.insert(name.to_string(), package.clone());
    Ok(package)
  }
}
