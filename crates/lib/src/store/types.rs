//! On-disk manifest shapes of a unipackage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deps::DependencyInfo;
use crate::resource::ResourceKind;
use crate::slice::UseSpec;

/// `unipackage.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnipackageManifest {
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub internal: Option<bool>,
  pub slices: Vec<IndexEntry>,
  #[serde(default)]
  pub default_slices: BTreeMap<String, Vec<String>>,
  #[serde(default)]
  pub test_slices: BTreeMap<String, Vec<String>>,
  #[serde(default)]
  pub plugins: Vec<IndexEntry>,
}

/// A slice or plugin listed in the top-level manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub name: String,
  pub arch: String,
  pub path: String,
}

/// `buildinfo.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
  #[serde(default)]
  pub dependencies: DependencyInfo,
  /// Absolute source directory the artifact was built from.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

/// `<slice>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceManifest {
  pub version: String,
  #[serde(default)]
  pub exports: Vec<String>,
  #[serde(default)]
  pub uses: Vec<UseSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_modules: Option<String>,
  #[serde(default)]
  pub boundary: String,
  #[serde(default)]
  pub resources: Vec<ResourceEntry>,
}

/// Kinds of stored resources. `prelink` holds phase-one output awaiting link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredKind {
  Prelink,
  Static,
  Js,
  Css,
  Head,
  Body,
}

impl From<ResourceKind> for StoredKind {
  fn from(kind: ResourceKind) -> Self {
    match kind {
      ResourceKind::Static => Self::Static,
      ResourceKind::Js => Self::Js,
      ResourceKind::Css => Self::Css,
      ResourceKind::Head => Self::Head,
      ResourceKind::Body => Self::Body,
    }
  }
}

impl StoredKind {
  /// The live resource kind, or `None` for prelinked files.
  pub fn resource_kind(self) -> Option<ResourceKind> {
    match self {
      Self::Prelink => None,
      Self::Static => Some(ResourceKind::Static),
      Self::Js => Some(ResourceKind::Js),
      Self::Css => Some(ResourceKind::Css),
      Self::Head => Some(ResourceKind::Head),
      Self::Body => Some(ResourceKind::Body),
    }
  }
}

/// One byte range of a payload file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
  #[serde(rename = "type")]
  pub kind: StoredKind,
  pub file: String,
  pub length: usize,
  pub offset: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub serve_path: Option<String>,
}

/// `plugin.<name>.<arch>/plugin.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
  pub version: String,
  pub name: String,
  pub arch: String,
  pub entry: String,
  #[serde(default)]
  pub uses: Vec<UseSpec>,
  #[serde(default)]
  pub sources: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub npm_dependencies: BTreeMap<String, String>,
}
