//! Declarative package descriptions.
//!
//! A description is read from `package.json` in the package root:
//!
//! ```json
//! {
//!   "summary": "Reactive lists",
//!   "on_use": {
//!     "use": ["core", { "spec": "templating", "where": "client" }],
//!     "files": ["list.js", { "path": "list.css", "where": "client" }],
//!     "export": ["List"]
//!   },
//!   "on_test": { "use": ["lists", "tinytest"], "files": ["list_tests.js"] },
//!   "plugins": [{ "name": "compile-less", "entry": "stylesheet", "sources": ["plugin/less.js"] }],
//!   "npm_dependencies": { "less": "1.3.3" }
//! }
//! ```
//!
//! An entry without `where` applies to both client and server.
//! The same structure can be assembled in code with [`PackageDescription::builder`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::slice::UseSpec;

/// Which side of the application an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Where {
  Client,
  Server,
}

/// One or several targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
  One(Where),
  Many(Vec<Where>),
}

impl Targets {
  fn includes(&self, target: Where) -> bool {
    match self {
      Self::One(w) => *w == target,
      Self::Many(ws) => ws.contains(&target),
    }
  }
}

impl From<Where> for Targets {
  fn from(w: Where) -> Self {
    Self::One(w)
  }
}

fn applies(targets: Option<&Targets>, target: Where) -> bool {
  targets.is_none_or(|t| t.includes(target))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UseEntry {
  Spec(String),
  Detailed {
    spec: String,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
    #[serde(default)]
    unordered: bool,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
  Path(String),
  Detailed {
    path: String,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportEntry {
  Symbol(String),
  Detailed {
    symbol: String,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
  },
}

/// Uses, files and exports for one role (`on_use` or `on_test`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
  #[serde(default, rename = "use")]
  pub uses: Vec<UseEntry>,
  #[serde(default)]
  pub files: Vec<FileEntry>,
  #[serde(default, rename = "export")]
  pub exports: Vec<ExportEntry>,
}

impl RoleSpec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn use_package(mut self, spec: &str, targets: Option<Targets>, unordered: bool) -> Self {
    self.uses.push(if targets.is_none() && !unordered {
      UseEntry::Spec(spec.to_string())
    } else {
      UseEntry::Detailed {
        spec: spec.to_string(),
        targets,
        unordered,
      }
    });
    self
  }

  pub fn add_file(mut self, path: &str, targets: Option<Targets>) -> Self {
    self.files.push(match targets {
      None => FileEntry::Path(path.to_string()),
      Some(targets) => FileEntry::Detailed {
        path: path.to_string(),
        targets: Some(targets),
      },
    });
    self
  }

  pub fn export(mut self, symbol: &str, targets: Option<Targets>) -> Self {
    self.exports.push(match targets {
      None => ExportEntry::Symbol(symbol.to_string()),
      Some(targets) => ExportEntry::Detailed {
        symbol: symbol.to_string(),
        targets: Some(targets),
      },
    });
    self
  }

  /// Parsed uses that apply to `target`, in declaration order.
  pub fn uses_for(&self, target: Where) -> Result<Vec<UseSpec>, ConfigError> {
    let mut uses = Vec::new();
    for entry in &self.uses {
      let (spec, targets, unordered) = match entry {
        UseEntry::Spec(spec) => (spec, None, false),
        UseEntry::Detailed {
          spec,
          targets,
          unordered,
        } => (spec, targets.as_ref(), *unordered),
      };
      if applies(targets, target) {
        uses.push(UseSpec::parse(spec, unordered)?);
      }
    }
    Ok(uses)
  }

  pub fn files_for(&self, target: Where) -> Vec<String> {
    self
      .files
      .iter()
      .filter_map(|entry| match entry {
        FileEntry::Path(path) => Some(path.clone()),
        FileEntry::Detailed { path, targets } => applies(targets.as_ref(), target).then(|| path.clone()),
      })
      .collect()
  }

  pub fn exports_for(&self, target: Where) -> Vec<String> {
    self
      .exports
      .iter()
      .filter_map(|entry| match entry {
        ExportEntry::Symbol(symbol) => Some(symbol.clone()),
        ExportEntry::Detailed { symbol, targets } => applies(targets.as_ref(), target).then(|| symbol.clone()),
      })
      .collect()
  }
}

/// A build plugin declared by a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
  #[serde(default)]
  pub name: String,
  /// Name of the program in the plugin catalog.
  pub entry: String,
  #[serde(default, rename = "use")]
  pub uses: Vec<String>,
  #[serde(default)]
  pub sources: Vec<String>,
  #[serde(default)]
  pub npm_dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageDescription {
  #[serde(default)]
  pub summary: Option<String>,
  #[serde(default)]
  pub internal: Option<bool>,
  #[serde(default)]
  pub on_use: Option<RoleSpec>,
  #[serde(default)]
  pub on_test: Option<RoleSpec>,
  #[serde(default)]
  pub plugins: Vec<PluginSpec>,
  #[serde(default)]
  pub npm_dependencies: Option<BTreeMap<String, String>>,
  /// Extension to the name of a catalog handler.
  #[serde(default)]
  pub legacy_extensions: BTreeMap<String, String>,
}

impl PackageDescription {
  pub fn builder(package: &str) -> DescriptionBuilder {
    DescriptionBuilder {
      package: package.to_string(),
      description: Self::default(),
    }
  }

  /// Read and parse a `package.json` file.
  pub fn read(path: &Path) -> Result<Self, ConfigError> {
    let contents = fs::read(path).map_err(|source| ConfigError::ReadDescriptor {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(path, &contents)
  }

  pub(crate) fn parse(path: &Path, contents: &[u8]) -> Result<Self, ConfigError> {
    serde_json::from_slice(contents).map_err(|source| ConfigError::ParseDescriptor {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Programmatic construction with the same one-per-role rules as files.
#[derive(Debug, Clone)]
pub struct DescriptionBuilder {
  package: String,
  description: PackageDescription,
}

impl DescriptionBuilder {
  pub fn summary(mut self, summary: &str) -> Self {
    self.description.summary = Some(summary.to_string());
    self
  }

  pub fn internal(mut self, internal: bool) -> Self {
    self.description.internal = Some(internal);
    self
  }

  pub fn on_use(mut self, role: RoleSpec) -> Result<Self, ConfigError> {
    if self.description.on_use.is_some() {
      return Err(self.duplicate_role("use"));
    }
    self.description.on_use = Some(role);
    Ok(self)
  }

  pub fn on_test(mut self, role: RoleSpec) -> Result<Self, ConfigError> {
    if self.description.on_test.is_some() {
      return Err(self.duplicate_role("test"));
    }
    self.description.on_test = Some(role);
    Ok(self)
  }

  pub fn npm_depends(mut self, dependencies: BTreeMap<String, String>) -> Result<Self, ConfigError> {
    if self.description.npm_dependencies.is_some() {
      return Err(ConfigError::DuplicateNpmDependencies {
        package: self.package.clone(),
      });
    }
    self.description.npm_dependencies = Some(dependencies);
    Ok(self)
  }

  pub fn plugin(mut self, plugin: PluginSpec) -> Self {
    self.description.plugins.push(plugin);
    self
  }

  pub fn legacy_extension(mut self, extension: &str, handler: &str) -> Result<Self, ConfigError> {
    if self.description.legacy_extensions.contains_key(extension) {
      return Err(ConfigError::DuplicateLegacyExtension {
        package: self.package.clone(),
        extension: extension.to_string(),
      });
    }
    self
      .description
      .legacy_extensions
      .insert(extension.to_string(), handler.to_string());
    Ok(self)
  }

  pub fn build(self) -> PackageDescription {
    self.description
  }

  fn duplicate_role(&self, role: &str) -> ConfigError {
    ConfigError::DuplicateRoleHandler {
      package: self.package.clone(),
      role: role.to_string(),
    }
  }
}
