use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::describe::{PackageDescription, Where};
use super::{Package, PackageMetadata};
use crate::consts::{
  APP_CONTROL_DIR, APP_PACKAGES_DIR, APP_PACKAGES_FILE, BROWSER_ARCH, CLIENT_SLICE, MAIN_SLICE, NATIVE_ARCH,
  NODE_MODULES_DIR, NPM_DIR, PACKAGE_DESCRIPTOR, SERVER_SLICE, TEST_SLICE,
};
use crate::deps::{DependencyInfo, DirectoryWatch, WatchPattern};
use crate::env::BuildEnv;
use crate::error::{CompileError, ConfigError, Result, display_name};
use crate::handler::HandlerEntry;
use crate::library::Library;
use crate::npm::{self, ensure_only_exact_versions};
use crate::plugin::{Plugin, validate_plugin_name};
use crate::scanner::{SourceScanner, default_ignore};
use crate::slice::{Slice, SliceOptions, UseSpec};
use crate::util::hash::{hash_bytes, hash_file};
use crate::util::paths::normalize_relative;

/// Programmatic definition of a single-slice package.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
  pub source_root: PathBuf,
  pub slice_name: String,
  pub uses: Vec<String>,
  pub sources: Vec<String>,
  pub force_export: Vec<String>,
  pub npm_dependencies: Option<BTreeMap<String, String>>,
  /// Defaults to `<source_root>/.npm`.
  pub npm_dir: Option<PathBuf>,
}

impl Package {
  /// Materialize the package whose `package.json` lives in `dir`.
  pub fn from_directory(name: &str, dir: &Path, env: &BuildEnv) -> Result<Self> {
    let descriptor = dir.join(PACKAGE_DESCRIPTOR);
    if !descriptor.is_file() {
      return Err(
        ConfigError::PackageNotFound {
          name: name.to_string(),
          path: dir.to_path_buf(),
        }
        .into(),
      );
    }

    let contents = fs::read(&descriptor).map_err(|source| ConfigError::ReadDescriptor {
      path: descriptor.clone(),
      source,
    })?;
    let description = PackageDescription::parse(&descriptor, &contents)?;

    let root = canonical_root(name, dir)?;
    let mut fingerprint = DependencyInfo::new();
    fingerprint.record_file(&root.join(PACKAGE_DESCRIPTOR), hash_bytes(&contents));

    build_from_description(name, root, &description, fingerprint, env)
  }

  /// Materialize a package from a description assembled in code.
  pub fn from_description(name: &str, dir: &Path, description: &PackageDescription, env: &BuildEnv) -> Result<Self> {
    let root = canonical_root(name, dir)?;
    build_from_description(name, root, description, DependencyInfo::new(), env)
  }

  /// Materialize a package with one slice from explicit options.
  pub fn from_options(name: &str, options: PackageOptions, env: &BuildEnv) -> Result<Self> {
    let root = canonical_root(name, &options.source_root)?;
    let npm_dir = options.npm_dir.clone().unwrap_or_else(|| root.join(NPM_DIR));
    let (arch, node_modules_path) = prepare_npm(name, &npm_dir, options.npm_dependencies.as_ref(), env)?;

    let mut uses = options
      .uses
      .iter()
      .map(|spec| UseSpec::parse(spec, false))
      .collect::<std::result::Result<Vec<_>, _>>()?;
    add_core_package(&mut uses, name, &options.slice_name, env);

    let mut package = Package::new(Some(name.to_string()));
    package.source_root = Some(root);
    package.slices.push(Slice::new(SliceOptions {
      name: options.slice_name.clone(),
      arch,
      uses,
      sources: normalize_sources(Some(name), &options.sources)?,
      force_export: options.force_export,
      dependency_info: DependencyInfo::new(),
      node_modules_path,
    }));
    package.default_slices = BTreeMap::from([(NATIVE_ARCH.to_string(), vec![options.slice_name])]);

    info!(package = %name, "initialized package from options");
    Ok(package)
  }

  /// Materialize an application from its directory.
  ///
  /// Sources are discovered with `scanner`, filtered to the extensions each
  /// slice can compile given the packages it uses from `library`.
  pub fn from_app_dir(dir: &Path, library: &Library, env: &BuildEnv, scanner: &dyn SourceScanner) -> Result<Self> {
    let root = dunce::canonicalize(dir).map_err(|source| ConfigError::ReadDescriptor {
      path: dir.to_path_buf(),
      source,
    })?;

    let control = root.join(APP_CONTROL_DIR).join(APP_PACKAGES_FILE);
    let mut control_info = DependencyInfo::new();
    let mut uses = Vec::new();
    if let Some(core) = &env.core_package {
      uses.push(UseSpec::new(core.as_str()));
    }
    if control.is_file() {
      let contents = fs::read(&control).map_err(|source| ConfigError::ReadDescriptor {
        path: control.clone(),
        source,
      })?;
      control_info.record_file(&control, hash_bytes(&contents));
      for line in String::from_utf8_lossy(&contents).lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
          continue;
        }
        let spec = UseSpec::parse(line, false)?;
        if !uses.contains(&spec) {
          uses.push(spec);
        }
      }
    }

    let mut package = Package::new(None);
    package.source_root = Some(root.clone());
    for (slice_name, arch) in [(CLIENT_SLICE, BROWSER_ARCH), (SERVER_SLICE, NATIVE_ARCH)] {
      package.slices.push(Slice::new(SliceOptions {
        name: slice_name.to_string(),
        arch: arch.to_string(),
        uses: uses.clone(),
        dependency_info: control_info.clone(),
        ..Default::default()
      }));
    }
    package.default_slices = BTreeMap::from([
      (BROWSER_ARCH.to_string(), vec![CLIENT_SLICE.to_string()]),
      (NATIVE_ARCH.to_string(), vec![SERVER_SLICE.to_string()]),
    ]);

    let ignore = default_ignore();
    for index in 0..package.slices.len() {
      let extensions = package.slices[index].registered_extensions(&package, library)?;
      let other = if package.slices[index].name == CLIENT_SLICE {
        SERVER_SLICE
      } else {
        CLIENT_SLICE
      };

      let sources: Vec<String> = scanner
        .scan(&root, &extensions, &ignore)
        .into_iter()
        .filter(|path| !path.starts_with(&format!("{}/", APP_PACKAGES_DIR)))
        .filter(|path| !has_segment(path, other) && !has_segment(path, "tests"))
        .collect();
      package.slices[index].add_sources(None, &sources)?;

      let slice = &mut package.slices[index];
      slice.dependency_info.watch_directory(
        &root,
        DirectoryWatch {
          include: extensions.iter().map(|ext| WatchPattern::extension(ext)).collect(),
          exclude: ignore.clone(),
        },
      );
      if let Ok(pattern) = WatchPattern::new(r"^package\.json$") {
        slice.dependency_info.watch_directory(
          &root.join(APP_PACKAGES_DIR),
          DirectoryWatch {
            include: vec![pattern],
            exclude: ignore.clone(),
          },
        );
      }
      debug!(slice = %slice, sources = sources.len(), "scanned application sources");
    }

    info!(root = ?root, uses = uses.len(), "initialized application");
    Ok(package)
  }
}

fn build_from_description(
  name: &str,
  root: PathBuf,
  description: &PackageDescription,
  fingerprint: DependencyInfo,
  env: &BuildEnv,
) -> Result<Package> {
  let (native_arch, node_modules_path) =
    prepare_npm(name, &root.join(NPM_DIR), description.npm_dependencies.as_ref(), env)?;

  let mut package = Package::new(Some(name.to_string()));
  package.source_root = Some(root.clone());
  package.metadata = PackageMetadata {
    summary: description.summary.clone(),
    internal: description.internal,
  };

  for (slice_name, role) in [(MAIN_SLICE, &description.on_use), (TEST_SLICE, &description.on_test)] {
    let role = role.clone().unwrap_or_default();
    for (arch, target) in [(BROWSER_ARCH, Where::Client), (native_arch.as_str(), Where::Server)] {
      let mut uses = role.uses_for(target)?;
      add_core_package(&mut uses, name, slice_name, env);

      package.slices.push(Slice::new(SliceOptions {
        name: slice_name.to_string(),
        arch: arch.to_string(),
        uses,
        sources: normalize_sources(Some(name), &role.files_for(target))?,
        force_export: role.exports_for(target),
        dependency_info: fingerprint.clone(),
        node_modules_path: if arch == native_arch {
          node_modules_path.clone()
        } else {
          None
        },
      }));
    }
  }

  package.default_slices = BTreeMap::from([
    (BROWSER_ARCH.to_string(), vec![MAIN_SLICE.to_string()]),
    (NATIVE_ARCH.to_string(), vec![MAIN_SLICE.to_string()]),
  ]);
  package.test_slices = BTreeMap::from([
    (BROWSER_ARCH.to_string(), vec![TEST_SLICE.to_string()]),
    (NATIVE_ARCH.to_string(), vec![TEST_SLICE.to_string()]),
  ]);

  for spec in &description.plugins {
    validate_plugin_name(Some(name), &spec.name)?;
    if package.plugins.contains_key(&spec.name) {
      return Err(
        ConfigError::DuplicatePlugin {
          package: name.to_string(),
          name: spec.name.clone(),
        }
        .into(),
      );
    }
    let program = env
      .catalog
      .plugin(&spec.entry)
      .ok_or_else(|| ConfigError::UnknownPluginEntry {
        plugin: spec.name.clone(),
        entry: spec.entry.clone(),
      })?;
    ensure_only_exact_versions(name, &spec.npm_dependencies)?;

    let mut plugin = Plugin::new(spec.name.as_str(), NATIVE_ARCH, spec.entry.as_str(), program);
    plugin.uses = spec
      .uses
      .iter()
      .map(|u| UseSpec::parse(u, false))
      .collect::<std::result::Result<Vec<_>, _>>()?;
    plugin.sources = normalize_sources(Some(name), &spec.sources)?;
    plugin.npm_dependencies = spec.npm_dependencies.clone();

    for source in &plugin.sources {
      let path = root.join(source);
      let hash = hash_file(&path).map_err(|e| CompileError::ReadSource {
        path: PathBuf::from(e.path),
        source: e.source,
      })?;
      package.dependency_info.record_file(&path, hash);
    }
    package.plugins.insert(spec.name.clone(), plugin);
  }

  for (extension, handler_name) in &description.legacy_extensions {
    let handler = env
      .catalog
      .handler(handler_name)
      .ok_or_else(|| ConfigError::UnknownHandler {
        package: name.to_string(),
        handler: handler_name.clone(),
      })?;
    package
      .legacy_handlers
      .insert(extension.clone(), HandlerEntry::new(Some(name), handler));
  }

  info!(
    package = %name,
    root = ?root,
    arch = %native_arch,
    plugins = package.plugins.len(),
    "initialized package from description"
  );
  Ok(package)
}

fn canonical_root(name: &str, dir: &Path) -> std::result::Result<PathBuf, ConfigError> {
  dunce::canonicalize(dir).map_err(|_| ConfigError::PackageNotFound {
    name: name.to_string(),
    path: dir.to_path_buf(),
  })
}

/// Validate npm declarations, refresh modules and pick the native arch.
fn prepare_npm(
  package: &str,
  npm_dir: &Path,
  dependencies: Option<&BTreeMap<String, String>>,
  env: &BuildEnv,
) -> std::result::Result<(String, Option<PathBuf>), ConfigError> {
  let Some(dependencies) = dependencies else {
    return Ok((NATIVE_ARCH.to_string(), None));
  };
  ensure_only_exact_versions(package, dependencies)?;

  if !env.skip_npm_update {
    match &env.npm {
      Some(provider) => provider
        .update_dependencies(package, npm_dir, dependencies)
        .map_err(|message| ConfigError::NpmUpdate {
          package: package.to_string(),
          message,
        })?,
      None => debug!(package, "no npm provider configured, using installed modules"),
    }
  }

  let portable = match &env.npm {
    Some(provider) => provider.dependencies_are_portable(npm_dir),
    None => npm::dependencies_are_portable(npm_dir),
  };
  let arch = if portable {
    NATIVE_ARCH.to_string()
  } else {
    env.host_arch.clone()
  };
  Ok((arch, Some(npm_dir.join(NODE_MODULES_DIR))))
}

/// Prepend the core package unless this is the core package's own `main`
/// slice or the slice already uses it (possibly unordered).
fn add_core_package(uses: &mut Vec<UseSpec>, package: &str, slice: &str, env: &BuildEnv) {
  let Some(core) = env.core_package.as_deref() else {
    return;
  };
  if package == core && slice == MAIN_SLICE {
    return;
  }
  if uses.iter().any(|spec| spec.package == core) {
    return;
  }
  uses.insert(0, UseSpec::new(core));
}

fn normalize_sources(package: Option<&str>, sources: &[String]) -> std::result::Result<Vec<String>, ConfigError> {
  sources
    .iter()
    .map(|source| {
      normalize_relative(source).ok_or_else(|| ConfigError::PathEscapesRoot {
        package: display_name(package),
        path: source.clone(),
      })
    })
    .collect()
}

fn has_segment(path: &str, segment: &str) -> bool {
  path.split('/').any(|part| part == segment)
}
