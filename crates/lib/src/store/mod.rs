//! Unipackages: compiled packages persisted to a directory tree.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── unipackage.json          # identity, slice and plugin index
//! ├── buildinfo.json           # merged dependency fingerprints + source path
//! ├── main.browser.json        # one manifest per slice
//! ├── main.browser/            # that slice's payload files
//! │   ├── head                 # all head fragments, newline-joined
//! │   └── packages/foo.js      # prelinked JavaScript
//! ├── node_modules/            # copied npm modules, if any
//! └── plugin.<name>.<arch>/
//!     └── plugin.json
//! ```
//!
//! Slices are named `[<slice>.]<arch>`, the prefix omitted for `main`.
//! Prelinked files are stored as `prelink` resources so a reloaded slice can
//! still be linked against whatever its dependencies export at bundle time.

mod types;
mod writer;

pub use types::{BuildInfo, IndexEntry, PluginManifest, ResourceEntry, SliceManifest, StoredKind, UnipackageManifest};
pub use writer::ArtifactBuilder;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::consts::{BUILDINFO_FILE, MAIN_SLICE, NODE_MODULES_DIR, PLUGIN_FILE, UNIPACKAGE_FILE, UNIPACKAGE_VERSION};
use crate::deps::{Freshness, StaleReason};
use crate::error::{ArtifactError, Result};
use crate::library::Library;
use crate::package::{Package, PackageMetadata};
use crate::plugin::{Plugin, PluginCatalog};
use crate::resource::{PrelinkFile, Resource, ResourceKind};
use crate::slice::{CompiledSlice, Slice};
use crate::util::paths::{has_parent_reference, serve_path_to_file};

#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions<'a> {
  /// Source directory recorded as the origin of the artifact.
  pub build_of_path: Option<&'a Path>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions<'a> {
  /// Return `None` instead of loading when the artifact is stale.
  pub only_if_up_to_date: bool,
  /// Source directory the artifact is expected to have been built from.
  pub build_of_path: Option<&'a Path>,
}

/// Concatenated head or body fragments of one slice.
struct SectionPayload {
  file: String,
  data: Vec<u8>,
  count: usize,
}

impl SectionPayload {
  /// Append a fragment, returning its offset.
  fn push(&mut self, fragment: &[u8]) -> usize {
    if self.count > 0 {
      self.data.push(b'\n');
    }
    let offset = self.data.len();
    self.data.extend_from_slice(fragment);
    self.count += 1;
    offset
  }
}

/// Compile every slice of `package` and write it to `target`.
pub fn save(package: &Package, library: &Library, target: &Path, options: SaveOptions<'_>) -> Result<PathBuf> {
  if !package.can_be_saved_as_unipackage() {
    return Err(ArtifactError::CannotSave(package.display_name()).into());
  }

  let mut builder = ArtifactBuilder::new(target)?;
  let mut dependencies = package.dependency_info.clone();
  let mut manifest = UnipackageManifest {
    version: UNIPACKAGE_VERSION.to_string(),
    summary: package.metadata.summary.clone(),
    internal: package.metadata.internal,
    slices: Vec::new(),
    default_slices: package.default_slices.clone(),
    test_slices: package.test_slices.clone(),
    plugins: Vec::new(),
  };
  let mut copied_node_modules: Option<PathBuf> = None;

  for slice in &package.slices {
    let compiled = slice.compile(package, library)?;
    dependencies.merge(&compiled.dependency_info);

    let base = builder.generate_filename(&slice_base_name(slice));
    let manifest_path = builder.generate_filename(&format!("{}.json", base));

    let mut resources = Vec::new();
    let mut head: Option<SectionPayload> = None;
    let mut body: Option<SectionPayload> = None;

    for resource in &compiled.resources {
      if resource.kind.is_document_section() {
        let section = if resource.kind == ResourceKind::Head {
          &mut head
        } else {
          &mut body
        };
        let payload = section.get_or_insert_with(|| SectionPayload {
          file: builder.generate_filename(&format!("{}/{}", base, resource.kind)),
          data: Vec::new(),
          count: 0,
        });
        let offset = payload.push(&resource.data);
        resources.push(ResourceEntry {
          kind: resource.kind.into(),
          file: payload.file.clone(),
          length: resource.data.len(),
          offset,
          serve_path: None,
        });
        continue;
      }

      let file = builder.generate_filename(&payload_name(&base, resource.serve_path.as_deref(), resource.kind.as_str()));
      builder.write(&file, &resource.data)?;
      resources.push(ResourceEntry {
        kind: resource.kind.into(),
        file,
        length: resource.data.len(),
        offset: 0,
        serve_path: resource.serve_path.clone(),
      });
    }

    for payload in [head, body].into_iter().flatten() {
      builder.write(&payload.file, &payload.data)?;
    }

    for prelinked in &compiled.prelink_files {
      let file = builder.generate_filename(&payload_name(&base, prelinked.serve_path.as_deref(), "prelink.js"));
      builder.write(&file, prelinked.source.as_bytes())?;
      resources.push(ResourceEntry {
        kind: StoredKind::Prelink,
        file,
        length: prelinked.source.len(),
        offset: 0,
        serve_path: prelinked.serve_path.clone(),
      });
    }

    let mut node_modules = None;
    if let Some(source) = slice.node_modules_path.as_deref().filter(|p| p.is_dir()) {
      if copied_node_modules.as_deref() != Some(source) {
        builder.copy_directory(source, NODE_MODULES_DIR)?;
        copied_node_modules = Some(source.to_path_buf());
      }
      node_modules = Some(NODE_MODULES_DIR.to_string());
    }

    builder.write_json(
      &manifest_path,
      &SliceManifest {
        version: UNIPACKAGE_VERSION.to_string(),
        exports: compiled.exports.clone(),
        uses: slice.uses.clone(),
        node_modules,
        boundary: compiled.boundary.clone(),
        resources,
      },
    )?;
    manifest.slices.push(IndexEntry {
      name: slice.name.clone(),
      arch: slice.arch.clone(),
      path: manifest_path,
    });
  }

  for plugin in package.plugins.values() {
    let dir = builder.generate_filename(&format!("plugin.{}.{}", plugin.name, plugin.arch));
    builder.write_json(
      &format!("{}/{}", dir, PLUGIN_FILE),
      &PluginManifest {
        version: UNIPACKAGE_VERSION.to_string(),
        name: plugin.name.clone(),
        arch: plugin.arch.clone(),
        entry: plugin.entry.clone(),
        uses: plugin.uses.clone(),
        sources: plugin.sources.clone(),
        npm_dependencies: plugin.npm_dependencies.clone(),
      },
    )?;
    manifest.plugins.push(IndexEntry {
      name: plugin.name.clone(),
      arch: plugin.arch.clone(),
      path: dir,
    });
  }

  builder.write_json(UNIPACKAGE_FILE, &manifest)?;
  builder.write_json(
    BUILDINFO_FILE,
    &BuildInfo {
      dependencies,
      source: options.build_of_path.map(|p| p.display().to_string()),
    },
  )?;

  let written = builder.complete()?;
  info!(package = %package.display_name(), path = ?written, slices = manifest.slices.len(), "saved unipackage");
  Ok(written)
}

/// Decide whether the artifact in `dir` can still be trusted.
pub fn check(dir: &Path, build_of_path: Option<&Path>) -> std::result::Result<Freshness, ArtifactError> {
  let info: BuildInfo = read_json(&dir.join(BUILDINFO_FILE))?;

  if let Some(expected) = build_of_path {
    let expected = expected.display().to_string();
    if info.source.as_deref() != Some(expected.as_str()) {
      return Ok(Freshness::Stale(StaleReason::SourceMismatch {
        recorded: info.source,
        expected,
      }));
    }
  }

  Ok(info.dependencies.check())
}

/// Load the unipackage in `dir` as package `name`.
///
/// With `only_if_up_to_date`, returns `Ok(None)` for a stale artifact.
pub fn load(name: &str, dir: &Path, catalog: &PluginCatalog, options: LoadOptions<'_>) -> Result<Option<Package>> {
  if options.only_if_up_to_date {
    if let Freshness::Stale(reason) = check(dir, options.build_of_path)? {
      info!(package = %name, path = ?dir, reason = %reason, "unipackage is stale");
      return Ok(None);
    }
  }

  let manifest: UnipackageManifest = read_json(&dir.join(UNIPACKAGE_FILE))?;
  ensure_version("unipackage", &manifest.version)?;
  let build_info: BuildInfo = read_json(&dir.join(BUILDINFO_FILE))?;

  let mut package = Package::new(Some(name.to_string()));
  package.metadata = PackageMetadata {
    summary: manifest.summary,
    internal: manifest.internal,
  };
  package.default_slices = manifest.default_slices;
  package.test_slices = manifest.test_slices;
  package.dependency_info = build_info.dependencies.clone();

  for entry in &manifest.slices {
    let slice_manifest: SliceManifest = read_json(&safe_join(dir, &entry.path)?)?;
    ensure_version("slice", &slice_manifest.version)?;

    let mut prelink_files = Vec::new();
    let mut resources = Vec::new();
    for resource in &slice_manifest.resources {
      let data = read_range(dir, resource)?;
      match resource.kind.resource_kind() {
        None => prelink_files.push(PrelinkFile {
          source: String::from_utf8_lossy(&data).into_owned(),
          serve_path: resource.serve_path.clone(),
        }),
        Some(kind) => resources.push(Resource::new(kind, data, resource.serve_path.clone())),
      }
    }

    let node_modules_path = match &slice_manifest.node_modules {
      Some(path) => Some(safe_join(dir, path)?),
      None => None,
    };

    debug!(package = %name, slice = %entry.name, arch = %entry.arch, resources = resources.len(), "loaded slice");
    package.slices.push(Slice::precompiled(
      entry.name.clone(),
      entry.arch.clone(),
      slice_manifest.uses,
      node_modules_path,
      CompiledSlice {
        exports: slice_manifest.exports,
        boundary: slice_manifest.boundary,
        prelink_files,
        resources,
        dependency_info: build_info.dependencies.clone(),
      },
    ));
  }

  for entry in &manifest.plugins {
    let plugin_dir = safe_join(dir, &entry.path)?;
    let plugin_manifest: PluginManifest = read_json(&plugin_dir.join(PLUGIN_FILE))?;
    ensure_version("plugin", &plugin_manifest.version)?;

    if package.plugins.contains_key(&plugin_manifest.name) {
      return Err(ArtifactError::DuplicatePlugin(plugin_manifest.name).into());
    }
    let program = catalog
      .plugin(&plugin_manifest.entry)
      .ok_or_else(|| ArtifactError::UnknownPluginEntry {
        plugin: plugin_manifest.name.clone(),
        entry: plugin_manifest.entry.clone(),
      })?;

    let mut plugin = Plugin::new(
      plugin_manifest.name.as_str(),
      plugin_manifest.arch.as_str(),
      plugin_manifest.entry.as_str(),
      program,
    );
    plugin.uses = plugin_manifest.uses;
    plugin.sources = plugin_manifest.sources;
    plugin.npm_dependencies = plugin_manifest.npm_dependencies;
    package.plugins.insert(plugin_manifest.name, plugin);
  }

  info!(package = %name, path = ?dir, slices = package.slices.len(), "loaded unipackage");
  Ok(Some(package))
}

fn slice_base_name(slice: &Slice) -> String {
  if slice.name == MAIN_SLICE {
    slice.arch.clone()
  } else {
    format!("{}.{}", slice.name, slice.arch)
  }
}

fn payload_name(base: &str, serve_path: Option<&str>, fallback: &str) -> String {
  let file = serve_path.map(serve_path_to_file).filter(|f| !f.is_empty());
  format!("{}/{}", base, file.as_deref().unwrap_or(fallback))
}

fn ensure_version(what: &str, version: &str) -> std::result::Result<(), ArtifactError> {
  if version == UNIPACKAGE_VERSION {
    Ok(())
  } else {
    Err(ArtifactError::UnsupportedVersion {
      what: what.to_string(),
      version: version.to_string(),
    })
  }
}

fn safe_join(dir: &Path, relative: &str) -> std::result::Result<PathBuf, ArtifactError> {
  if has_parent_reference(relative) || Path::new(relative).is_absolute() {
    return Err(ArtifactError::PathTraversal(relative.to_string()));
  }
  Ok(dir.join(relative))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, ArtifactError> {
  let contents = fs::read(path).map_err(|source| ArtifactError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_slice(&contents).map_err(|source| ArtifactError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn read_range(dir: &Path, entry: &ResourceEntry) -> std::result::Result<Vec<u8>, ArtifactError> {
  let path = safe_join(dir, &entry.file)?;
  let read_err = |source| ArtifactError::Read {
    path: path.clone(),
    source,
  };

  let mut file = File::open(&path).map_err(read_err)?;
  let available = file.metadata().map_err(read_err)?.len().saturating_sub(entry.offset as u64);
  if (entry.length as u64) > available {
    return Err(ArtifactError::Truncated {
      file: entry.file.clone(),
      expected: entry.length,
      actual: usize::try_from(available).unwrap_or(usize::MAX),
    });
  }

  file.seek(SeekFrom::Start(entry.offset as u64)).map_err(read_err)?;
  let mut data = Vec::new();
  file.take(entry.length as u64).read_to_end(&mut data).map_err(read_err)?;

  if data.len() != entry.length {
    return Err(ArtifactError::Truncated {
      file: entry.file.clone(),
      expected: entry.length,
      actual: data.len(),
    });
  }
  Ok(data)
}

/// Group an already linked resource list by kind, for display.
pub fn summarize(resources: &[Resource]) -> BTreeMap<&'static str, usize> {
  let mut summary = BTreeMap::new();
  for resource in resources {
    *summary.entry(resource.kind.as_str()).or_insert(0) += 1;
  }
  summary
}
