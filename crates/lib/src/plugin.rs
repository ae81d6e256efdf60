//! Build plugins: compiled programs that register source handlers.
//!
//! A package declares plugins by name and entry. The entry names a program in
//! the [`PluginCatalog`]; executing it (once per package, on first demand for
//! the package's handler map) registers handlers into a [`PluginRegistrar`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConfigError, display_name};
use crate::handler::builtin::{JavaScriptHandler, StylesheetHandler};
use crate::handler::{HandlerEntry, HandlerMap, SourceHandler};
use crate::slice::UseSpec;

/// A compiled plugin program.
pub trait BuildPlugin: Send + Sync {
  fn register(&self, registrar: &mut PluginRegistrar<'_>) -> Result<(), ConfigError>;
}

/// Collects the handlers one package's plugins register.
pub struct PluginRegistrar<'a> {
  package: Option<&'a str>,
  handlers: &'a mut HandlerMap,
}

impl<'a> PluginRegistrar<'a> {
  pub(crate) fn new(package: Option<&'a str>, handlers: &'a mut HandlerMap) -> Self {
    Self { package, handlers }
  }

  /// Register `handler` for files ending in `.<extension>`.
  ///
  /// Each extension may be registered once per package.
  pub fn register_source_handler(
    &mut self,
    extension: &str,
    handler: Arc<dyn SourceHandler>,
  ) -> Result<(), ConfigError> {
    if self.handlers.contains_key(extension) {
      return Err(ConfigError::DuplicateSourceHandler {
        package: display_name(self.package),
        extension: extension.to_string(),
      });
    }
    debug!(package = %display_name(self.package), extension, "registered source handler");
    self
      .handlers
      .insert(extension.to_string(), HandlerEntry::new(self.package, handler));
    Ok(())
  }
}

/// A plugin program that registers a fixed set of handlers.
pub struct ExtensionPlugin {
  registrations: Vec<(String, Arc<dyn SourceHandler>)>,
}

impl ExtensionPlugin {
  pub fn new<I, S>(registrations: I) -> Self
  where
    I: IntoIterator<Item = (S, Arc<dyn SourceHandler>)>,
    S: Into<String>,
  {
    Self {
      registrations: registrations.into_iter().map(|(ext, h)| (ext.into(), h)).collect(),
    }
  }
}

impl BuildPlugin for ExtensionPlugin {
  fn register(&self, registrar: &mut PluginRegistrar<'_>) -> Result<(), ConfigError> {
    for (extension, handler) in &self.registrations {
      registrar.register_source_handler(extension, handler.clone())?;
    }
    Ok(())
  }
}

/// Plugin programs and named handlers available to package descriptions.
#[derive(Clone, Default)]
pub struct PluginCatalog {
  plugins: BTreeMap<String, Arc<dyn BuildPlugin>>,
  handlers: BTreeMap<String, Arc<dyn SourceHandler>>,
}

impl PluginCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// The `javascript` and `stylesheet` plugins, plus handlers of the same
  /// names for legacy extension registration. Each plugin shares its handler
  /// instance with the named handler.
  pub fn builtin() -> Self {
    let js: Arc<dyn SourceHandler> = Arc::new(JavaScriptHandler);
    let css: Arc<dyn SourceHandler> = Arc::new(StylesheetHandler);

    Self::new()
      .with_plugin("javascript", Arc::new(ExtensionPlugin::new([("js", js.clone())])))
      .with_plugin("stylesheet", Arc::new(ExtensionPlugin::new([("css", css.clone())])))
      .with_handler("javascript", js)
      .with_handler("stylesheet", css)
  }

  pub fn with_plugin(mut self, entry: &str, plugin: Arc<dyn BuildPlugin>) -> Self {
    self.plugins.insert(entry.to_string(), plugin);
    self
  }

  pub fn with_handler(mut self, name: &str, handler: Arc<dyn SourceHandler>) -> Self {
    self.handlers.insert(name.to_string(), handler);
    self
  }

  pub fn plugin(&self, entry: &str) -> Option<Arc<dyn BuildPlugin>> {
    self.plugins.get(entry).cloned()
  }

  pub fn handler(&self, name: &str) -> Option<Arc<dyn SourceHandler>> {
    self.handlers.get(name).cloned()
  }

  pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
    self.plugins.keys().map(String::as_str)
  }
}

impl fmt::Debug for PluginCatalog {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PluginCatalog")
      .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
      .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
      .finish()
  }
}

/// A plugin attached to a package, built for one architecture.
#[derive(Clone)]
pub struct Plugin {
  pub name: String,
  pub arch: String,
  pub entry: String,
  pub uses: Vec<UseSpec>,
  pub sources: Vec<String>,
  pub npm_dependencies: BTreeMap<String, String>,
  program: Arc<dyn BuildPlugin>,
}

impl Plugin {
  pub fn new(
    name: impl Into<String>,
    arch: impl Into<String>,
    entry: impl Into<String>,
    program: Arc<dyn BuildPlugin>,
  ) -> Self {
    Self {
      name: name.into(),
      arch: arch.into(),
      entry: entry.into(),
      uses: Vec::new(),
      sources: Vec::new(),
      npm_dependencies: BTreeMap::new(),
      program,
    }
  }

  pub fn program(&self) -> &Arc<dyn BuildPlugin> {
    &self.program
  }
}

impl fmt::Debug for Plugin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Plugin")
      .field("name", &self.name)
      .field("arch", &self.arch)
      .field("entry", &self.entry)
      .field("uses", &self.uses)
      .field("sources", &self.sources)
      .finish()
  }
}

/// Reject plugin names that are empty or could escape their directory.
pub(crate) fn validate_plugin_name(package: Option<&str>, name: &str) -> Result<(), ConfigError> {
  if name.is_empty() {
    return Err(ConfigError::MissingPluginName {
      package: display_name(package),
    });
  }
  if name.contains("..") || name.contains('/') || name.contains('\\') {
    return Err(ConfigError::BadPluginName {
      package: display_name(package),
      name: name.to_string(),
    });
  }
  Ok(())
}
