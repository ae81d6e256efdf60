//! Source handlers and the compile step they run against.
//!
//! A handler turns one source file into resources. It never touches the
//! filesystem: the bytes it sees come through [`CompileStep::read`], which are
//! the same bytes recorded in the slice's dependency fingerprint.
//!
//! # Submodules
//!
//! - [`builtin`] - pass-through JavaScript and stylesheet handlers

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::arch::is_browser;
use crate::error::{ConfigError, display_name};
use crate::linker::JsInput;
use crate::resource::{Resource, ResourceKind};
use crate::util::paths::join_serve_path;

/// Failure raised by a handler while compiling one file.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
  #[error("{operation} can only be emitted to browser targets (arch '{arch}')")]
  BrowserOnly { operation: &'static str, arch: String },

  #[error("'section' must be 'head' or 'body', got '{0}'")]
  BadSection(String),

  #[error("input is not valid UTF-8")]
  InvalidUtf8,

  #[error("{0}")]
  Failed(String),
}

/// Compiles source files with a given extension.
pub trait SourceHandler: Send + Sync {
  fn compile(&self, step: &mut CompileStep<'_>) -> Result<(), HandlerError>;
}

/// Document section a fragment is appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  Head,
  Body,
}

impl FromStr for Section {
  type Err = HandlerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "head" => Ok(Self::Head),
      "body" => Ok(Self::Body),
      other => Err(HandlerError::BadSection(other.to_string())),
    }
  }
}

/// Everything a handler emitted for the slice being compiled.
#[derive(Debug, Default)]
pub(crate) struct CompileOutput {
  pub resources: Vec<Resource>,
  pub js: Vec<JsInput>,
}

/// The restricted view of one input file handed to a [`SourceHandler`].
pub struct CompileStep<'a> {
  input_path: &'a str,
  arch: &'a str,
  root_output_path: &'a str,
  contents: &'a [u8],
  read_offset: usize,
  violation: Option<HandlerError>,
  output: &'a mut CompileOutput,
}

impl<'a> CompileStep<'a> {
  pub(crate) fn new(
    input_path: &'a str,
    arch: &'a str,
    root_output_path: &'a str,
    contents: &'a [u8],
    output: &'a mut CompileOutput,
  ) -> Self {
    Self {
      input_path,
      arch,
      root_output_path,
      contents,
      read_offset: 0,
      violation: None,
      output,
    }
  }

  /// Path of the input relative to the package root, e.g. `lib/foo.coffee`.
  pub fn input_path(&self) -> &str {
    self.input_path
  }

  /// Total number of bytes in the input.
  pub fn input_size(&self) -> usize {
    self.contents.len()
  }

  /// The architecture being built for.
  pub fn arch(&self) -> &str {
    self.arch
  }

  /// Root serve path that emitted paths are namespaced under (`/packages/foo`).
  pub fn root_output_path(&self) -> &str {
    self.root_output_path
  }

  /// Read the next `n` bytes, or the rest of the input when `n` is `None` or
  /// runs past the end.
  pub fn read(&mut self, n: Option<usize>) -> &[u8] {
    let remaining = self.contents.len() - self.read_offset;
    let n = n.map_or(remaining, |n| n.min(remaining));
    let start = self.read_offset;
    self.read_offset += n;
    &self.contents[start..start + n]
  }

  /// Read the rest of the input as UTF-8 text.
  pub fn read_to_string(&mut self) -> Result<String, HandlerError> {
    let bytes = self.read(None);
    String::from_utf8(bytes.to_vec()).map_err(|_| HandlerError::InvalidUtf8)
  }

  /// Add markup to the `<head>` or `<body>` of the document. Browser only.
  pub fn append_document(&mut self, section: Section, data: impl Into<String>) -> Result<(), HandlerError> {
    self.require_browser("document sections")?;
    let kind = match section {
      Section::Head => ResourceKind::Head,
      Section::Body => ResourceKind::Body,
    };
    self.output.resources.push(Resource::new(kind, data.into(), None));
    Ok(())
  }

  /// Add a stylesheet. `path` is a requested serve path. Browser only.
  pub fn add_stylesheet(&mut self, path: &str, data: impl Into<String>) -> Result<(), HandlerError> {
    self.require_browser("stylesheets")?;
    let serve_path = join_serve_path(self.root_output_path, path);
    self
      .output
      .resources
      .push(Resource::new(ResourceKind::Css, data.into(), Some(serve_path)));
    Ok(())
  }

  /// Add JavaScript, namespaced into this package's environment at link time.
  pub fn add_javascript(&mut self, path: &str, data: impl Into<String>) {
    self.output.js.push(JsInput {
      source: data.into(),
      serve_path: join_serve_path(self.root_output_path, path),
    });
  }

  /// Add a file served as-is. Browser only.
  pub fn add_asset(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<(), HandlerError> {
    self.require_browser("static assets")?;
    let serve_path = join_serve_path(self.root_output_path, path);
    self
      .output
      .resources
      .push(Resource::new(ResourceKind::Static, data, Some(serve_path)));
    Ok(())
  }

  /// Fails with the first browser-only violation, even when the handler
  /// ignored the error it was given.
  pub(crate) fn finish(&mut self) -> Result<(), HandlerError> {
    match self.violation.take() {
      Some(violation) => Err(violation),
      None => Ok(()),
    }
  }

  fn require_browser(&mut self, operation: &'static str) -> Result<(), HandlerError> {
    if is_browser(self.arch) {
      return Ok(());
    }
    let err = HandlerError::BrowserOnly {
      operation,
      arch: self.arch.to_string(),
    };
    if self.violation.is_none() {
      self.violation = Some(err.clone());
    }
    Err(err)
  }
}

/// A registered handler together with the package that registered it.
#[derive(Clone)]
pub struct HandlerEntry {
  pub owner: Option<String>,
  pub handler: Arc<dyn SourceHandler>,
}

impl HandlerEntry {
  pub fn new(owner: Option<&str>, handler: Arc<dyn SourceHandler>) -> Self {
    Self {
      owner: owner.map(str::to_string),
      handler,
    }
  }

  /// Identity comparison: the same handler object, not an equal one.
  pub fn same_handler(&self, other: &HandlerEntry) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(&other.handler))
  }
}

impl fmt::Debug for HandlerEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandlerEntry")
      .field("owner", &self.owner)
      .field("handler", &Arc::as_ptr(&self.handler))
      .finish()
  }
}

/// Extension (without the dot) to handler.
pub type HandlerMap = BTreeMap<String, HandlerEntry>;

/// Overlay `incoming` onto `target` for the slices of `consumer`.
///
/// An extension already present must map to the identical handler object;
/// anything else is a conflict naming both owning packages.
pub fn overlay(target: &mut HandlerMap, incoming: &HandlerMap, consumer: Option<&str>) -> Result<(), ConfigError> {
  for (extension, entry) in incoming {
    if let Some(existing) = target.get(extension) {
      if !existing.same_handler(entry) {
        return Err(ConfigError::HandlerConflict {
          consumer: display_name(consumer),
          first: display_name(existing.owner.as_deref()),
          second: display_name(entry.owner.as_deref()),
          extension: extension.clone(),
        });
      }
      continue;
    }
    target.insert(extension.clone(), entry.clone());
  }
  Ok(())
}
