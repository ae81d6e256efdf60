//! Saving packages as unipackages and reloading them.

use std::fs;
use std::path::{Path, PathBuf};

use unibuild_lib::consts::{BUILD_DIR, UNIPACKAGE_FILE};
use unibuild_lib::deps::{Freshness, StaleReason};
use unibuild_lib::env::BuildEnv;
use unibuild_lib::error::{ArtifactError, Error};
use unibuild_lib::library::Library;
use unibuild_lib::plugin::PluginCatalog;
use unibuild_lib::resource::ResourceKind;
use unibuild_lib::slice::UseSpec;
use unibuild_lib::store::{self, LoadOptions, SliceManifest, UnipackageManifest};

use super::common::{Workspace, core_env, extended_catalog, linked_js, resources, write};

const WIDGETS: &str = r#"{
  "summary": "widgets for tests",
  "plugins": [{ "name": "frag", "entry": "fragments" }],
  "on_use": {
    "files": [
      "widget.js",
      { "path": "a.frag", "where": "client" },
      { "path": "b.frag", "where": "client" },
      "logo.png",
      "widget.css"
    ]
  }
}"#;

fn env() -> BuildEnv {
  core_env().with_catalog(extended_catalog())
}

/// A workspace whose `widgets` package has been built and saved.
fn saved_workspace() -> (Workspace, PathBuf) {
  let ws = Workspace::new();
  ws.package(
    "widgets",
    WIDGETS,
    &[
      ("widget.js", "// @export Widget\nWidget = function () {};\n"),
      ("a.frag", "<meta a>\n---\n<p a>\n"),
      ("b.frag", "<meta b>\n---\n<p b>\n"),
      ("logo.png", "PNG"),
      ("widget.css", ".w {}"),
    ],
  );
  let library = ws.library(env());
  let written = library.save_built().unwrap();

  let root = dunce::canonicalize(ws.package_dir("widgets")).unwrap();
  assert!(written.contains(&root.join(BUILD_DIR)), "{:?}", written);
  (ws, root)
}

fn is_cached(library: &Library, name: &str) -> bool {
  library.get(name).unwrap().source_root.is_none()
}

fn read_manifest<T: serde::de::DeserializeOwned>(path: &Path) -> T {
  serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn write_manifest<T: serde::Serialize>(path: &Path, value: &T) {
  fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Path of the first slice manifest listed in the unipackage.
fn first_slice_manifest(build: &Path) -> PathBuf {
  let manifest: UnipackageManifest = read_manifest(&build.join(UNIPACKAGE_FILE));
  build.join(&manifest.slices[0].path)
}

mod round_trip {
  use super::*;

  #[test]
  fn reloaded_package_matches_the_original() {
    let ws = Workspace::new();
    ws.package(
      "widgets",
      WIDGETS,
      &[
        ("widget.js", "// @export Widget\nWidget = function () {};\n"),
        ("a.frag", "<meta a>\n---\n<p a>\n"),
        ("b.frag", "<meta b>\n---\n<p b>\n"),
        ("logo.png", "PNG"),
        ("widget.css", ".w {}"),
      ],
    );
    let fresh = ws.library(env());
    let expected_browser = resources(&fresh, "widgets", "browser");
    let expected_native = resources(&fresh, "widgets", "native");
    fresh.save_built().unwrap();

    let cached = ws.library(env());
    assert!(is_cached(&cached, "widgets"));
    assert!(is_cached(&cached, "core"));

    assert_eq!(resources(&cached, "widgets", "browser"), expected_browser);
    assert_eq!(resources(&cached, "widgets", "native"), expected_native);

    let kinds: Vec<_> = expected_browser.iter().map(|r| r.kind).collect();
    assert_eq!(
      kinds,
      vec![
        ResourceKind::Head,
        ResourceKind::Body,
        ResourceKind::Head,
        ResourceKind::Body,
        ResourceKind::Static,
        ResourceKind::Css,
        ResourceKind::Js,
      ]
    );

    let slice = &cached.get_slices(&UseSpec::new("widgets"), "native").unwrap()[0];
    assert!(slice.slice().is_compiled());
    assert_eq!(slice.exports(&cached).unwrap(), vec!["Widget"]);
    assert_eq!(slice.slice().uses, vec![UseSpec::new("core")]);

    let package = cached.get("widgets").unwrap();
    assert_eq!(package.metadata.summary.as_deref(), Some("widgets for tests"));
    assert_eq!(package.get_test_slices("native").unwrap()[0].name, "tests");
  }

  #[test]
  fn document_sections_share_one_payload_per_kind() {
    let (_ws, root) = saved_workspace();
    let build = root.join(BUILD_DIR);

    let slice: SliceManifest = read_manifest(&first_slice_manifest(&build));
    let heads: Vec<_> = slice
      .resources
      .iter()
      .filter(|r| r.kind == store::StoredKind::Head)
      .collect();
    assert_eq!(heads.len(), 2);
    assert_eq!(heads[0].file, heads[1].file);
    assert_eq!((heads[0].offset, heads[0].length), (0, 9));
    assert_eq!((heads[1].offset, heads[1].length), (10, 9));
    assert_eq!(fs::read_to_string(build.join(&heads[0].file)).unwrap(), "<meta a>\n\n<meta b>\n");

    assert!(slice.resources.iter().any(|r| r.kind == store::StoredKind::Prelink));
    assert!(!slice.boundary.is_empty());
  }

  #[test]
  fn plugins_are_persisted_and_rerun() {
    let (ws, _root) = saved_workspace();
    let cached = ws.library(env());

    let package = cached.get("widgets").unwrap();
    let plugin = &package.plugins["frag"];
    assert_eq!(plugin.entry, "fragments");
    assert_eq!(plugin.arch, "native");
    assert!(package.plugin_handlers().unwrap().contains_key("frag"));
  }

  #[test]
  fn source_package_links_against_cached_dependency() {
    let (ws, _root) = saved_workspace();
    ws.package(
      "gadget",
      r#"{"on_use": {"use": ["widgets"], "files": ["g.js"]}}"#,
      &[("g.js", "Widget();\n")],
    );
    let library = ws.library(env());

    assert!(is_cached(&library, "widgets"));
    assert!(!is_cached(&library, "gadget"));
    let js = linked_js(&resources(&library, "gadget", "native"));
    assert!(js.contains("var Widget = Package[\"widgets\"].Widget;"), "{}", js);
  }

  #[test]
  fn npm_modules_are_copied_into_the_artifact() {
    let ws = Workspace::new();
    ws.package(
      "npmish",
      r#"{"npm_dependencies": {"left-pad": "1.3.0"}, "on_use": {"files": ["n.js"]}}"#,
      &[("n.js", "N = 1;\n"), (".npm/node_modules/left-pad/index.js", "module.exports = 1;\n")],
    );
    let library = ws.library(env());
    library.save_built().unwrap();

    let root = dunce::canonicalize(ws.package_dir("npmish")).unwrap();
    let copied = root.join(BUILD_DIR).join("node_modules/left-pad/index.js");
    assert_eq!(fs::read_to_string(copied).unwrap(), "module.exports = 1;\n");

    let cached = ws.library(env());
    let slice = &cached.get_slices(&UseSpec::new("npmish"), "native").unwrap()[0];
    assert_eq!(
      slice.slice().node_modules_path.as_deref(),
      Some(root.join(BUILD_DIR).join("node_modules").as_path())
    );
  }
}

mod staleness {
  use super::*;

  #[test]
  fn one_byte_change_rebuilds_and_revert_reuses() {
    let (ws, root) = saved_workspace();
    let build = root.join(BUILD_DIR);
    assert!(store::check(&build, Some(&root)).unwrap().is_up_to_date());

    write(&root, "widget.js", "// @export Widget\nWidget = function () {}!\n");
    assert!(matches!(
      store::check(&build, Some(&root)).unwrap(),
      Freshness::Stale(StaleReason::FileChanged(_))
    ));
    assert!(!is_cached(&ws.library(env()), "widgets"));

    write(&root, "widget.js", "// @export Widget\nWidget = function () {};\n");
    assert!(store::check(&build, Some(&root)).unwrap().is_up_to_date());
    assert!(is_cached(&ws.library(env()), "widgets"));
  }

  #[test]
  fn descriptor_change_is_stale() {
    let (_ws, root) = saved_workspace();
    write(&root, "package.json", &WIDGETS.replace("widgets for tests", "other"));

    assert!(!store::check(&root.join(BUILD_DIR), Some(&root)).unwrap().is_up_to_date());
  }

  #[test]
  fn artifact_from_another_source_tree_is_stale() {
    let (ws, root) = saved_workspace();
    let elsewhere = ws.root().join("elsewhere");

    let freshness = store::check(&root.join(BUILD_DIR), Some(&elsewhere)).unwrap();
    assert!(matches!(freshness, Freshness::Stale(StaleReason::SourceMismatch { .. })));
  }

  #[test]
  fn stale_artifact_loads_as_none_when_freshness_is_required() {
    let (_ws, root) = saved_workspace();
    write(&root, "widget.css", ".w { color: red }");

    let options = LoadOptions {
      only_if_up_to_date: true,
      build_of_path: Some(&root),
    };
    let loaded = store::load("widgets", &root.join(BUILD_DIR), &extended_catalog(), options).unwrap();
    assert!(loaded.is_none());

    let loaded = store::load("widgets", &root.join(BUILD_DIR), &extended_catalog(), LoadOptions::default()).unwrap();
    assert!(loaded.is_some());
  }
}

mod corrupt_artifacts {
  use super::*;

  fn load(root: &Path, catalog: &PluginCatalog) -> Result<(), Error> {
    store::load("widgets", &root.join(BUILD_DIR), catalog, LoadOptions::default()).map(|_| ())
  }

  #[test]
  fn unsupported_version_is_rejected_and_rebuilt() {
    let (ws, root) = saved_workspace();
    let path = root.join(BUILD_DIR).join(UNIPACKAGE_FILE);
    let mut manifest: UnipackageManifest = read_manifest(&path);
    manifest.version = "2".to_string();
    write_manifest(&path, &manifest);

    let err = load(&root, &extended_catalog()).unwrap_err();
    assert!(matches!(err, Error::Artifact(ArtifactError::UnsupportedVersion { .. })), "{}", err);

    assert!(!is_cached(&ws.library(env()), "widgets"));
  }

  #[test]
  fn resource_path_outside_the_artifact_is_rejected() {
    let (_ws, root) = saved_workspace();
    let path = first_slice_manifest(&root.join(BUILD_DIR));
    let mut slice: SliceManifest = read_manifest(&path);
    slice.resources[0].file = "../package.json".to_string();
    write_manifest(&path, &slice);

    let err = load(&root, &extended_catalog()).unwrap_err();
    assert!(matches!(err, Error::Artifact(ArtifactError::PathTraversal(_))), "{}", err);
  }

  #[test]
  fn truncated_payload_is_rejected() {
    let (_ws, root) = saved_workspace();
    let build = root.join(BUILD_DIR);
    let slice: SliceManifest = read_manifest(&first_slice_manifest(&build));
    fs::write(build.join(&slice.resources[0].file), "").unwrap();

    let err = load(&root, &extended_catalog()).unwrap_err();
    assert!(
      matches!(err, Error::Artifact(ArtifactError::Truncated { actual: 0, .. })),
      "{}",
      err
    );
  }

  #[test]
  fn plugin_missing_from_catalog_is_rejected() {
    let (_ws, root) = saved_workspace();

    let err = load(&root, &PluginCatalog::builtin()).unwrap_err();
    assert!(matches!(err, Error::Artifact(ArtifactError::UnknownPluginEntry { .. })), "{}", err);
  }
}

mod saving {
  use super::*;

  #[test]
  fn legacy_packages_are_skipped() {
    let ws = Workspace::new();
    ws.package("legacy", r#"{"legacy_extensions": {"txt": "javascript"}}"#, &[]);
    let library = ws.library(env());

    let written = library.save_built().unwrap();
    let root = dunce::canonicalize(ws.package_dir("legacy")).unwrap();
    assert!(!written.contains(&root.join(BUILD_DIR)));
    assert!(!root.join(BUILD_DIR).exists());

    let package = library.get("legacy").unwrap();
    let err = store::save(&package, &library, &root.join(BUILD_DIR), Default::default()).unwrap_err();
    assert!(matches!(err, Error::Artifact(ArtifactError::CannotSave(_))));
  }

  #[test]
  fn resaving_replaces_the_previous_artifact() {
    let (ws, root) = saved_workspace();
    let build = root.join(BUILD_DIR);
    fs::write(build.join("leftover"), "x").unwrap();

    write(&root, "widget.js", "// @export Widget\nWidget = 2;\n");
    let library = ws.library(env());
    library.save_built().unwrap();

    assert!(!build.join("leftover").exists());
    assert!(store::check(&build, Some(&root)).unwrap().is_up_to_date());
    let entries: Vec<_> = fs::read_dir(&root)
      .unwrap()
      .flatten()
      .map(|e| e.file_name().to_string_lossy().into_owned())
      .filter(|name| name.starts_with(".unibuild-staging-"))
      .collect();
    assert!(entries.is_empty(), "{:?}", entries);
  }
}
