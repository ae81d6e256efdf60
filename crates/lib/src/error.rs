//! Error types for the build engine.
//!
//! Errors fall into four classes, none of which are retried:
//! - [`ConfigError`]: a package or plugin is declared incorrectly
//! - [`CompileError`]: a source handler failed on one file
//! - [`ResolutionError`]: a requested package, slice or arch does not exist
//! - [`ArtifactError`]: a persisted unipackage is unreadable or untrustworthy

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::handler::HandlerError;

pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Compile(#[from] CompileError),

  #[error(transparent)]
  Resolution(#[from] ResolutionError),

  #[error(transparent)]
  Artifact(#[from] ArtifactError),
}

/// Mistakes in a package description, fatal at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("the package named {name} does not exist at {}", path.display())]
  PackageNotFound { name: String, path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  ReadDescriptor {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  ParseDescriptor {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("package {package} may have only one {role} handler")]
  DuplicateRoleHandler { package: String, role: String },

  #[error("package {package} declares npm dependencies more than once")]
  DuplicateNpmDependencies { package: String },

  #[error("package {package} must use an exact version for npm dependency {dependency} (got '{version}')")]
  InexactNpmVersion {
    package: String,
    dependency: String,
    version: String,
  },

  #[error("failed to update npm dependencies of {package}: {message}")]
  NpmUpdate { package: String, message: String },

  #[error("build plugins require a name (package {package})")]
  MissingPluginName { package: String },

  #[error("bad plugin name '{name}' in package {package}")]
  BadPluginName { package: String, name: String },

  #[error("two plugins have the same name in package {package}: '{name}'")]
  DuplicatePlugin { package: String, name: String },

  #[error("plugin '{plugin}' refers to unknown entry '{entry}'")]
  UnknownPluginEntry { plugin: String, entry: String },

  #[error("package {package} refers to unknown source handler '{handler}'")]
  UnknownHandler { package: String, handler: String },

  #[error("package {package} defines two source handlers for the same extension ('.{extension}')")]
  DuplicateSourceHandler { package: String, extension: String },

  #[error("package {package} has already registered a handler for '.{extension}'")]
  DuplicateLegacyExtension { package: String, extension: String },

  #[error(
    "conflict: two packages included in {consumer}, {first} and {second}, are both trying to handle .{extension}"
  )]
  HandlerConflict {
    consumer: String,
    first: String,
    second: String,
    extension: String,
  },

  #[error("bad package spec: '{0}'")]
  MalformedSpec(String),

  #[error("path '{path}' escapes the root of {package}")]
  PathEscapesRoot { package: String, path: String },

  #[error("too late to add sources to slice {slice}: it has already been compiled")]
  SourcesFrozen { slice: String },
}

/// A source handler failed; the slice being compiled is abandoned.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error("failed to read source {}: {source}", path.display())]
  ReadSource {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("while compiling {path} in {package}: {source}")]
  Handler {
    package: String,
    path: String,
    #[source]
    source: HandlerError,
  },

  #[error("slice {slice} has no source root to compile from")]
  NoSourceRoot { slice: String },
}

/// A requested package, slice or architecture is unavailable.
#[derive(Debug, Error)]
pub enum ResolutionError {
  #[error("unknown package '{0}'")]
  UnknownPackage(String),

  #[error("{package} does not have a slice named '{slice}' that runs on architecture '{arch}'")]
  NoSuchSlice {
    package: String,
    slice: String,
    arch: String,
  },

  #[error("{package} is not compatible with architecture '{arch}'")]
  IncompatibleArch { package: String, arch: String },

  #[error("{package} does not have tests for architecture '{arch}'")]
  NoTests { package: String, arch: String },

  #[error("slice of arch '{slice_arch}' does not support '{bundle_arch}'")]
  UnsupportedBundleArch { slice_arch: String, bundle_arch: String },
}

/// A persisted unipackage could not be written or trusted.
#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize {what}: {source}")]
  Serialize {
    what: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported unipackage {what} version: {version:?}")]
  UnsupportedVersion { what: String, version: String },

  #[error("bad path in unipackage: '{0}'")]
  PathTraversal(String),

  #[error("couldn't read entire resource {file}: expected {expected} bytes, got {actual}")]
  Truncated {
    file: String,
    expected: usize,
    actual: usize,
  },

  #[error("unipackage plugin '{plugin}' refers to unknown entry '{entry}'")]
  UnknownPluginEntry { plugin: String, entry: String },

  #[error("cannot yet handle fat plugins: '{0}' appears more than once")]
  DuplicatePlugin(String),

  #[error("package {0} can not be saved as a unipackage (it registers legacy extension handlers)")]
  CannotSave(String),
}

/// Human-readable package name, with the application spelled out.
pub(crate) fn display_name(name: Option<&str>) -> String {
  name.map(str::to_string).unwrap_or_else(|| "your app".to_string())
}
