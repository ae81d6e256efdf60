//! Third-party npm module dependencies.
//!
//! Fetching modules is delegated to an [`NpmProvider`]; the engine only
//! validates declarations and decides whether the installed modules are
//! portable across native architectures.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::ConfigError;

static EXACT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?$").expect("version pattern is valid")
});

/// Installs declared npm modules into a package's `.npm` directory.
pub trait NpmProvider: Send + Sync {
  /// Bring `npm_dir/node_modules` in line with `dependencies`.
  fn update_dependencies(
    &self,
    package: &str,
    npm_dir: &Path,
    dependencies: &BTreeMap<String, String>,
  ) -> Result<(), String>;

  /// Whether the installed modules run on any native architecture.
  fn dependencies_are_portable(&self, npm_dir: &Path) -> bool {
    dependencies_are_portable(npm_dir)
  }
}

/// Reject version ranges. A version must be exact (`1.2.3`, `1.2.3-beta.1`)
/// or a URL pinned to a commit with `#`.
pub fn ensure_only_exact_versions(package: &str, dependencies: &BTreeMap<String, String>) -> Result<(), ConfigError> {
  for (dependency, version) in dependencies {
    let pinned_url = version.contains("://") && version.contains('#');
    if !EXACT_VERSION.is_match(version) && !pinned_url {
      return Err(ConfigError::InexactNpmVersion {
        package: package.to_string(),
        dependency: dependency.clone(),
        version: version.clone(),
      });
    }
  }
  Ok(())
}

/// Installed modules are portable unless they contain compiled `.node` addons.
pub fn dependencies_are_portable(npm_dir: &Path) -> bool {
  !WalkDir::new(npm_dir)
    .into_iter()
    .flatten()
    .any(|entry| entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "node"))
}
