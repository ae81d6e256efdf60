//! Packages: named bundles of slices and plugins.
//!
//! A package is materialized one of four ways:
//! - from a package directory holding a `package.json` description
//!   ([`Package::from_directory`])
//! - from a description built in code ([`Package::from_description`])
//! - from programmatic options for a single slice ([`Package::from_options`])
//! - from an application directory ([`Package::from_app_dir`])
//!
//! or reloaded from a unipackage by [`crate::store::load`].
//!
//! # Submodules
//!
//! - [`describe`] - the declarative description format and its builder
//! - `init` - materialization from descriptions, options and app directories

pub mod describe;
mod init;

pub use init::PackageOptions;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::arch::most_specific;
use crate::deps::DependencyInfo;
use crate::error::{ConfigError, ResolutionError, display_name};
use crate::handler::HandlerMap;
use crate::plugin::{Plugin, PluginRegistrar};
use crate::slice::Slice;

/// Free-form descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub internal: Option<bool>,
}

#[derive(Debug)]
pub struct Package {
  /// `None` for the application, which links into the global namespace.
  pub name: Option<String>,
  pub source_root: Option<PathBuf>,
  pub serve_root: String,
  pub metadata: PackageMetadata,
  pub slices: Vec<Slice>,
  /// Arch to the slice names used when the package is referenced without a slice.
  pub default_slices: BTreeMap<String, Vec<String>>,
  /// Arch to the slice names holding the package's tests.
  pub test_slices: BTreeMap<String, Vec<String>>,
  pub plugins: BTreeMap<String, Plugin>,
  /// Handlers registered directly on the package rather than through a plugin.
  pub legacy_handlers: HandlerMap,
  /// Fingerprints shared by every slice, such as plugin sources.
  pub dependency_info: DependencyInfo,
  plugin_handlers: Mutex<Option<Arc<HandlerMap>>>,
}

impl Package {
  pub fn new(name: Option<String>) -> Self {
    let serve_root = match &name {
      Some(name) => format!("/packages/{}", name),
      None => "/".to_string(),
    };
    Self {
      name,
      source_root: None,
      serve_root,
      metadata: PackageMetadata::default(),
      slices: Vec::new(),
      default_slices: BTreeMap::new(),
      test_slices: BTreeMap::new(),
      plugins: BTreeMap::new(),
      legacy_handlers: HandlerMap::new(),
      dependency_info: DependencyInfo::new(),
      plugin_handlers: Mutex::new(None),
    }
  }

  /// The package name, or "your app".
  pub fn display_name(&self) -> String {
    display_name(self.name.as_deref())
  }

  /// Handlers registered by this package's plugins.
  ///
  /// Plugins run once, on the first call; later calls return the same map.
  pub fn plugin_handlers(&self) -> Result<Arc<HandlerMap>, ConfigError> {
    let mut memo = self.plugin_handlers.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handlers) = memo.as_ref() {
      return Ok(handlers.clone());
    }

    let mut handlers = HandlerMap::new();
    {
      let mut registrar = PluginRegistrar::new(self.name.as_deref(), &mut handlers);
      for plugin in self.plugins.values() {
        plugin.program().register(&mut registrar)?;
      }
    }
    info!(
      package = %self.display_name(),
      plugins = self.plugins.len(),
      extensions = ?handlers.keys().collect::<Vec<_>>(),
      "initialized plugins"
    );

    let handlers = Arc::new(handlers);
    *memo = Some(handlers.clone());
    Ok(handlers)
  }

  /// Plugin handlers with the package's legacy handlers on top. A legacy
  /// handler replaces a plugin handler for the same extension.
  pub fn own_handlers(&self) -> Result<HandlerMap, ConfigError> {
    let mut handlers = (*self.plugin_handlers()?).clone();
    handlers.extend(self.legacy_handlers.iter().map(|(ext, entry)| (ext.clone(), entry.clone())));
    Ok(handlers)
  }

  /// Index of the slice called `name` best suited to `arch`.
  pub fn slice_index(&self, name: &str, arch: &str) -> Result<usize, ResolutionError> {
    let no_such_slice = || ResolutionError::NoSuchSlice {
      package: self.display_name(),
      slice: name.to_string(),
      arch: arch.to_string(),
    };

    let candidates = self
      .slices
      .iter()
      .filter(|slice| slice.name == name)
      .map(|slice| slice.arch.as_str());
    let chosen = most_specific(arch, candidates).ok_or_else(no_such_slice)?;

    self
      .slices
      .iter()
      .position(|slice| slice.name == name && slice.arch == chosen)
      .ok_or_else(no_such_slice)
  }

  pub fn get_single_slice(&self, name: &str, arch: &str) -> Result<&Slice, ResolutionError> {
    Ok(&self.slices[self.slice_index(name, arch)?])
  }

  /// Indices of the slices used when this package is referenced by name alone.
  pub fn default_slice_indices(&self, arch: &str) -> Result<Vec<usize>, ResolutionError> {
    let names = select(&self.default_slices, arch).ok_or_else(|| ResolutionError::IncompatibleArch {
      package: self.display_name(),
      arch: arch.to_string(),
    })?;
    names.iter().map(|name| self.slice_index(name, arch)).collect()
  }

  pub fn get_default_slices(&self, arch: &str) -> Result<Vec<&Slice>, ResolutionError> {
    Ok(
      self
        .default_slice_indices(arch)?
        .into_iter()
        .map(|index| &self.slices[index])
        .collect(),
    )
  }

  pub fn test_slice_indices(&self, arch: &str) -> Result<Vec<usize>, ResolutionError> {
    let names = select(&self.test_slices, arch).ok_or_else(|| ResolutionError::NoTests {
      package: self.display_name(),
      arch: arch.to_string(),
    })?;
    names.iter().map(|name| self.slice_index(name, arch)).collect()
  }

  pub fn get_test_slices(&self, arch: &str) -> Result<Vec<&Slice>, ResolutionError> {
    Ok(
      self
        .test_slice_indices(arch)?
        .into_iter()
        .map(|index| &self.slices[index])
        .collect(),
    )
  }

  /// Packages with legacy handlers carry behavior a unipackage cannot record.
  pub fn can_be_saved_as_unipackage(&self) -> bool {
    self.legacy_handlers.is_empty()
  }
}

fn select<'a>(table: &'a BTreeMap<String, Vec<String>>, arch: &str) -> Option<&'a Vec<String>> {
  let chosen = most_specific(arch, table.keys().map(String::as_str))?;
  table.get(chosen)
}
