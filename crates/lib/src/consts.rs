//! Shared constants for file names, format versions, and serve paths.

pub const APP_NAME: &str = "unibuild";

/// Declarative package description read from a package's source root.
pub const PACKAGE_DESCRIPTOR: &str = "package.json";

/// Directory (relative to a package's source root) holding its cached artifact.
pub const BUILD_DIR: &str = ".build";

/// Top-level unipackage manifest.
pub const UNIPACKAGE_FILE: &str = "unipackage.json";

/// Build fingerprint record.
pub const BUILDINFO_FILE: &str = "buildinfo.json";

/// Per-plugin control file inside a plugin directory.
pub const PLUGIN_FILE: &str = "plugin.json";

/// Embedded third-party module directory.
pub const NODE_MODULES_DIR: &str = "node_modules";

/// The only manifest version understood by this engine.
pub const UNIPACKAGE_VERSION: &str = "1";

/// Serve path of the import stub emitted for the application.
pub const IMPORT_STUB_SERVE_PATH: &str = "/packages/global-imports.js";

/// Slice name used by a package's `on_use` role.
pub const MAIN_SLICE: &str = "main";

/// Slice name used by a package's `on_test` role.
pub const TEST_SLICE: &str = "tests";

/// Architecture for portable server-side slices.
pub const NATIVE_ARCH: &str = "native";

/// Architecture for client-side slices.
pub const BROWSER_ARCH: &str = "browser";

/// Length of the hash prefix embedded in boundary tokens.
pub const BOUNDARY_HASH_LEN: usize = 16;

/// Per-package directory holding npm state.
pub const NPM_DIR: &str = ".npm";

/// Application control directory.
pub const APP_CONTROL_DIR: &str = ".unibuild";

/// File in [`APP_CONTROL_DIR`] listing the packages an application uses, one per line.
pub const APP_PACKAGES_FILE: &str = "packages";

/// Directory of an application holding its local packages.
pub const APP_PACKAGES_DIR: &str = "packages";

/// Application slice for the browser.
pub const CLIENT_SLICE: &str = "client";

/// Application slice for the server.
pub const SERVER_SLICE: &str = "server";
