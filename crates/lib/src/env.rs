//! Build configuration shared by every package materialized in one pass.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::arch;
use crate::npm::NpmProvider;
use crate::plugin::PluginCatalog;

/// Overrides the detected host architecture.
pub const ARCH_ENV: &str = "UNIBUILD_ARCH";

/// Names a package that every slice implicitly uses.
pub const CORE_PACKAGE_ENV: &str = "UNIBUILD_CORE_PACKAGE";

#[derive(Clone)]
pub struct BuildEnv {
  pub catalog: PluginCatalog,
  /// Package prepended to every slice's uses, except its own `main` slices.
  pub core_package: Option<String>,
  /// Arch used for slices whose npm modules are not portable.
  pub host_arch: String,
  pub npm: Option<Arc<dyn NpmProvider>>,
  /// Trust an existing `.npm/node_modules` instead of refreshing it.
  pub skip_npm_update: bool,
}

impl Default for BuildEnv {
  fn default() -> Self {
    Self {
      catalog: PluginCatalog::builtin(),
      core_package: None,
      host_arch: arch::host(),
      npm: None,
      skip_npm_update: false,
    }
  }
}

impl BuildEnv {
  /// Defaults with environment overrides applied.
  pub fn from_env() -> Self {
    let mut env = Self::default();

    if let Some(arch) = non_empty_var(ARCH_ENV) {
      debug!(arch = %arch, "host arch overridden from environment");
      env.host_arch = arch;
    }
    env.core_package = non_empty_var(CORE_PACKAGE_ENV);

    env
  }

  pub fn with_core_package(mut self, name: &str) -> Self {
    self.core_package = Some(name.to_string());
    self
  }

  pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
    self.catalog = catalog;
    self
  }

  pub fn with_npm(mut self, provider: Arc<dyn NpmProvider>) -> Self {
    self.npm = Some(provider);
    self
  }
}

impl fmt::Debug for BuildEnv {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildEnv")
      .field("catalog", &self.catalog)
      .field("core_package", &self.core_package)
      .field("host_arch", &self.host_arch)
      .field("npm", &self.npm.is_some())
      .field("skip_npm_update", &self.skip_npm_update)
      .finish()
  }
}

fn non_empty_var(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
