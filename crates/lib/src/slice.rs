//! Slices: the (package, name, arch) compilation unit.
//!
//! A slice starts uncompiled with a list of sources. The first request for
//! its exports or resources runs every source through its handler and
//! prelinks the resulting JavaScript; the result is cached for the life of
//! the slice. Phase-two linking happens per bundle in [`Slice::get_resources`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::arch::{is_browser, matches};
use crate::consts::MAIN_SLICE;
use crate::deps::DependencyInfo;
use crate::error::{CompileError, ConfigError, ResolutionError, Result, display_name};
use crate::handler::{CompileOutput, CompileStep, HandlerMap, overlay};
use crate::library::Library;
use crate::linker::{self, LinkOptions, PrelinkOptions};
use crate::package::Package;
use crate::resource::{PrelinkFile, Resource, ResourceKind};
use crate::util::hash::hash_bytes;
use crate::util::paths::{extension, join_serve_path, normalize_relative};

/// A reference to another package, optionally naming one of its slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseSpec {
  pub package: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub slice: Option<String>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub unordered: bool,
}

impl UseSpec {
  /// Parse `"pkg"` or `"pkg.slice"`.
  pub fn parse(spec: &str, unordered: bool) -> std::result::Result<Self, ConfigError> {
    let parts: Vec<&str> = spec.split('.').collect();
    let (package, slice) = match parts.as_slice() {
      [package] => (*package, None),
      [package, slice] => (*package, Some(slice.to_string())),
      _ => return Err(ConfigError::MalformedSpec(spec.to_string())),
    };
    if package.is_empty() || slice.as_deref() == Some("") {
      return Err(ConfigError::MalformedSpec(spec.to_string()));
    }
    Ok(Self {
      package: package.to_string(),
      slice,
      unordered,
    })
  }

  pub fn new(package: impl Into<String>) -> Self {
    Self {
      package: package.into(),
      slice: None,
      unordered: false,
    }
  }
}

impl fmt::Display for UseSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.slice {
      Some(slice) => write!(f, "{}.{}", self.package, slice),
      None => write!(f, "{}", self.package),
    }
  }
}

/// The immutable result of compiling a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSlice {
  pub exports: Vec<String>,
  pub boundary: String,
  pub prelink_files: Vec<PrelinkFile>,
  /// Non-JavaScript resources in emission order.
  pub resources: Vec<Resource>,
  pub dependency_info: DependencyInfo,
}

/// Construction parameters for an uncompiled [`Slice`].
#[derive(Debug, Clone, Default)]
pub struct SliceOptions {
  pub name: String,
  pub arch: String,
  pub uses: Vec<UseSpec>,
  pub sources: Vec<String>,
  pub force_export: Vec<String>,
  pub dependency_info: DependencyInfo,
  pub node_modules_path: Option<PathBuf>,
}

#[derive(Debug)]
struct SliceState {
  sources: Vec<String>,
  compiled: Option<Arc<CompiledSlice>>,
}

#[derive(Debug)]
pub struct Slice {
  pub name: String,
  pub arch: String,
  pub uses: Vec<UseSpec>,
  pub force_export: Vec<String>,
  /// Fingerprints known before compilation (descriptors, watched directories).
  pub dependency_info: DependencyInfo,
  pub node_modules_path: Option<PathBuf>,
  state: Mutex<SliceState>,
}

impl Slice {
  pub fn new(options: SliceOptions) -> Self {
    Self {
      name: options.name,
      arch: options.arch,
      uses: options.uses,
      force_export: options.force_export,
      dependency_info: options.dependency_info,
      node_modules_path: options.node_modules_path,
      state: Mutex::new(SliceState {
        sources: options.sources,
        compiled: None,
      }),
    }
  }

  /// A slice restored from a unipackage, already compiled.
  pub(crate) fn precompiled(
    name: String,
    arch: String,
    uses: Vec<UseSpec>,
    node_modules_path: Option<PathBuf>,
    compiled: CompiledSlice,
  ) -> Self {
    Self {
      name,
      arch,
      uses,
      force_export: Vec::new(),
      dependency_info: compiled.dependency_info.clone(),
      node_modules_path,
      state: Mutex::new(SliceState {
        sources: Vec::new(),
        compiled: Some(Arc::new(compiled)),
      }),
    }
  }

  fn state(&self) -> MutexGuard<'_, SliceState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn sources(&self) -> Vec<String> {
    self.state().sources.clone()
  }

  pub fn is_compiled(&self) -> bool {
    self.state().compiled.is_some()
  }

  /// Append package-relative source paths.
  ///
  /// Paths are normalized and must stay inside the package root. Fails once
  /// the slice has been compiled.
  pub fn add_sources<I, S>(&self, package: Option<&str>, paths: I) -> std::result::Result<(), ConfigError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut state = self.state();
    if state.compiled.is_some() {
      return Err(ConfigError::SourcesFrozen {
        slice: self.to_string(),
      });
    }
    for path in paths {
      let path = path.as_ref();
      let normalized = normalize_relative(path).ok_or_else(|| ConfigError::PathEscapesRoot {
        package: display_name(package),
        path: path.to_string(),
      })?;
      state.sources.push(normalized);
    }
    Ok(())
  }

  /// Compile the slice if needed and return the cached result.
  pub fn compile(&self, package: &Package, library: &Library) -> Result<Arc<CompiledSlice>> {
    let mut state = self.state();
    if let Some(compiled) = &state.compiled {
      return Ok(compiled.clone());
    }

    let compiled = Arc::new(self.compile_sources(package, library, &state.sources)?);
    state.compiled = Some(compiled.clone());
    Ok(compiled)
  }

  /// Exported symbols, compiling first if needed.
  pub fn exports(&self, package: &Package, library: &Library) -> Result<Vec<String>> {
    Ok(self.compile(package, library)?.exports.clone())
  }

  /// Extensions this slice can compile, sorted.
  pub fn registered_extensions(&self, package: &Package, library: &Library) -> Result<Vec<String>> {
    let handlers = effective_handlers(package.name.as_deref(), package.own_handlers()?, &self.uses, library)?;
    Ok(handlers.into_keys().collect())
  }

  /// Fully linked resources for a bundle targeting `bundle_arch`.
  ///
  /// Imports come from the non-unordered uses in declaration order; when two
  /// used packages export the same symbol the later use wins.
  pub fn get_resources(&self, bundle_arch: &str, package: &Package, library: &Library) -> Result<Vec<Resource>> {
    if !matches(bundle_arch, &self.arch) {
      return Err(
        ResolutionError::UnsupportedBundleArch {
          slice_arch: self.arch.clone(),
          bundle_arch: bundle_arch.to_string(),
        }
        .into(),
      );
    }

    let compiled = self.compile(package, library)?;

    let mut imports = BTreeMap::new();
    for spec in self.uses.iter().filter(|spec| !spec.unordered) {
      for dependency in library.get_slices(spec, bundle_arch)? {
        let Some(provider) = dependency.package.name.as_deref() else {
          continue;
        };
        for symbol in &dependency.compile(library)?.exports {
          imports.insert(symbol.clone(), provider.to_string());
        }
      }
    }

    let linked = linker::link(LinkOptions {
      use_global_namespace: package.name.is_none(),
      prelinked: &compiled.prelink_files,
      boundary: &compiled.boundary,
      imports: &imports,
    });

    let mut resources = compiled.resources.clone();
    for file in linked {
      let duplicate = file.serve_path.is_some()
        && resources
          .iter()
          .any(|r| r.kind == ResourceKind::Js && r.serve_path == file.serve_path);
      if !duplicate {
        resources.push(Resource::new(ResourceKind::Js, file.source, file.serve_path));
      }
    }

    debug!(
      slice = %self,
      package = %display_name(package.name.as_deref()),
      bundle_arch,
      imports = imports.len(),
      resources = resources.len(),
      "linked slice"
    );
    Ok(resources)
  }

  fn compile_sources(&self, package: &Package, library: &Library, sources: &[String]) -> Result<CompiledSlice> {
    let package_name = display_name(package.name.as_deref());
    let source_root = package
      .source_root
      .as_deref()
      .ok_or_else(|| CompileError::NoSourceRoot { slice: self.to_string() })?;
    let handlers = effective_handlers(package.name.as_deref(), package.own_handlers()?, &self.uses, library)?;

    info!(package = %package_name, slice = %self, sources = sources.len(), "compiling slice");

    let mut dependency_info = self.dependency_info.clone();
    let mut output = CompileOutput::default();

    for relative in sources {
      let absolute = source_root.join(relative);
      let contents = fs::read(&absolute).map_err(|source| CompileError::ReadSource {
        path: absolute.clone(),
        source,
      })?;
      dependency_info.record_file(&absolute, hash_bytes(&contents));

      let Some(entry) = handlers.get(extension(relative)) else {
        if is_browser(&self.arch) {
          let serve_path = join_serve_path(&package.serve_root, relative);
          output
            .resources
            .push(Resource::new(ResourceKind::Static, contents, Some(serve_path)));
        } else {
          debug!(path = %relative, arch = %self.arch, "no handler, file only fingerprinted");
        }
        continue;
      };

      let mut step = CompileStep::new(relative, &self.arch, &package.serve_root, &contents, &mut output);
      let outcome = entry.handler.compile(&mut step);
      outcome
        .and_then(|()| step.finish())
        .map_err(|source| CompileError::Handler {
          package: package_name.clone(),
          path: relative.clone(),
          source,
        })?;
    }

    let combined_serve_path = combined_serve_path(package.name.as_deref(), &self.name);
    let prelinked = linker::prelink(PrelinkOptions {
      inputs: &output.js,
      use_global_namespace: package.name.is_none(),
      name: package.name.as_deref(),
      combined_serve_path: &combined_serve_path,
      force_export: &self.force_export,
    });

    Ok(CompiledSlice {
      exports: prelinked.exports,
      boundary: prelinked.boundary,
      prelink_files: prelinked.files,
      resources: output.resources,
      dependency_info,
    })
  }
}

impl fmt::Display for Slice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.name, self.arch)
  }
}

/// A slice together with the package that owns it.
#[derive(Debug, Clone)]
pub struct SliceRef {
  pub package: Arc<Package>,
  index: usize,
}

impl SliceRef {
  pub(crate) fn new(package: Arc<Package>, index: usize) -> Self {
    Self { package, index }
  }

  pub fn slice(&self) -> &Slice {
    &self.package.slices[self.index]
  }

  pub fn compile(&self, library: &Library) -> Result<Arc<CompiledSlice>> {
    self.slice().compile(&self.package, library)
  }

  pub fn exports(&self, library: &Library) -> Result<Vec<String>> {
    self.slice().exports(&self.package, library)
  }

  pub fn get_resources(&self, bundle_arch: &str, library: &Library) -> Result<Vec<Resource>> {
    self.slice().get_resources(bundle_arch, &self.package, library)
  }
}

/// Serve path of the single wrapped file for a named package's slice.
fn combined_serve_path(package: Option<&str>, slice: &str) -> String {
  let name = package.unwrap_or("global");
  if slice == MAIN_SLICE {
    format!("/packages/{}.js", name)
  } else {
    format!("/packages/{}.{}.js", name, slice)
  }
}

/// Handlers visible to a slice: its own package's, then each used package's
/// own handlers, never replacing earlier entries.
pub(crate) fn effective_handlers(
  consumer: Option<&str>,
  own: HandlerMap,
  uses: &[UseSpec],
  library: &Library,
) -> Result<HandlerMap> {
  let mut handlers = own;
  for spec in uses {
    let dependency = library.get(&spec.package)?;
    overlay(&mut handlers, &dependency.own_handlers()?, consumer)?;
  }
  Ok(handlers)
}
