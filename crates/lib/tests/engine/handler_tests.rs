//! Source handler registration, visibility and failure reporting.

use std::sync::Arc;

use unibuild_lib::handler::{CompileStep, HandlerError, SourceHandler};
use unibuild_lib::plugin::{ExtensionPlugin, PluginCatalog};
use unibuild_lib::resource::ResourceKind;
use unibuild_lib::slice::UseSpec;

use super::common::{FragmentHandler, Workspace, core_env, extended_catalog, linked_js, resources};

mod visibility {
  use super::*;

  #[test]
  fn plugin_handlers_reach_consumers() {
    let ws = Workspace::new();
    ws.package("frags", r#"{"plugins": [{"name": "frag", "entry": "fragments"}]}"#, &[]);
    ws.package(
      "site",
      r#"{"on_use": {"use": ["frags"], "files": [{"path": "page.frag", "where": "client"}]}}"#,
      &[("page.frag", "<title>hi</title>\n---\n<p>body</p>\n")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let browser = resources(&library, "site", "browser");
    let sections: Vec<_> = browser.iter().map(|r| (r.kind, r.text())).collect();
    assert_eq!(
      sections,
      vec![
        (ResourceKind::Head, "<title>hi</title>\n".to_string()),
        (ResourceKind::Body, "<p>body</p>\n".to_string()),
      ]
    );

    let slice = &library.get_slices(&UseSpec::new("site"), "browser").unwrap()[0];
    let extensions = slice.slice().registered_extensions(&slice.package, &library).unwrap();
    assert_eq!(extensions, vec!["css", "frag", "js"]);
  }

  #[test]
  fn handlers_are_not_transitive() {
    let ws = Workspace::new();
    ws.package("frags", r#"{"plugins": [{"name": "frag", "entry": "fragments"}]}"#, &[]);
    ws.package("middle", r#"{"on_use": {"use": ["frags"]}}"#, &[]);
    ws.package(
      "site",
      r#"{"on_use": {"use": ["middle"], "files": ["page.frag"]}}"#,
      &[("page.frag", "<p>")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let browser = resources(&library, "site", "browser");
    assert_eq!(browser.len(), 1);
    assert_eq!(browser[0].kind, ResourceKind::Static);
    assert_eq!(browser[0].serve_path.as_deref(), Some("/packages/site/page.frag"));
  }

  #[test]
  fn legacy_extensions_apply_to_consumers() {
    let ws = Workspace::new();
    ws.package("legacy", r#"{"legacy_extensions": {"txt": "javascript"}}"#, &[]);
    ws.package(
      "app",
      r#"{"on_use": {"use": ["legacy"], "files": ["notes.txt"]}}"#,
      &[("notes.txt", "// @export Notes\nNotes = 'plain';\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "app", "native"));
    assert!(js.contains("Notes = 'plain';"), "{}", js);
    assert!(js.contains("Package[\"app\"] = {\n  Notes: Notes\n};"), "{}", js);
  }

  #[test]
  fn unknown_legacy_handler_is_rejected_at_load() {
    let ws = Workspace::new();
    ws.package("legacy", r#"{"legacy_extensions": {"txt": "markdown"}}"#, &[]);

    let mut library = unibuild_lib::library::Library::new(core_env());
    let err = library.load_package("legacy", &ws.package_dir("legacy")).unwrap_err();
    assert!(err.to_string().contains("markdown"), "{}", err);
  }
}

mod conflicts {
  use super::*;

  /// Two catalog entries registering `.frag`, each with its own handler object.
  fn rival_catalog() -> PluginCatalog {
    let first: Arc<dyn SourceHandler> = Arc::new(FragmentHandler);
    let second: Arc<dyn SourceHandler> = Arc::new(FragmentHandler);
    PluginCatalog::builtin()
      .with_plugin("frag-a", Arc::new(ExtensionPlugin::new([("frag", first)])))
      .with_plugin("frag-b", Arc::new(ExtensionPlugin::new([("frag", second)])))
  }

  #[test]
  fn distinct_handlers_for_one_extension_conflict() {
    let ws = Workspace::new();
    ws.package("alpha", r#"{"plugins": [{"name": "frag", "entry": "frag-a"}]}"#, &[]);
    ws.package("beta", r#"{"plugins": [{"name": "frag", "entry": "frag-b"}]}"#, &[]);
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["alpha", "beta"], "files": ["c.js"]}}"#,
      &[("c.js", "C = 1;\n")],
    );
    let library = ws.library(core_env().with_catalog(rival_catalog()));

    let slice = &library.get_slices(&UseSpec::new("consumer"), "browser").unwrap()[0];
    let message = slice.compile(&library).unwrap_err().to_string();

    assert!(message.contains("consumer"), "{}", message);
    assert!(message.contains("alpha"), "{}", message);
    assert!(message.contains("beta"), "{}", message);
    assert!(message.contains(".frag"), "{}", message);
  }

  #[test]
  fn the_same_handler_object_from_two_packages_is_accepted() {
    let ws = Workspace::new();
    ws.package("alpha", r#"{"plugins": [{"name": "frag", "entry": "fragments"}]}"#, &[]);
    ws.package("beta", r#"{"plugins": [{"name": "frag", "entry": "fragments"}]}"#, &[]);
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["alpha", "beta"], "files": [{"path": "c.frag", "where": "client"}]}}"#,
      &[("c.frag", "<meta>\n---\n")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let browser = resources(&library, "consumer", "browser");
    assert_eq!(browser[0].kind, ResourceKind::Head);
  }

  #[test]
  fn builtin_legacy_handler_matches_builtin_plugin() {
    let ws = Workspace::new();
    ws.package("legacy", r#"{"legacy_extensions": {"js": "javascript"}}"#, &[]);
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["legacy"], "files": ["c.js"]}}"#,
      &[("c.js", "C = 1;\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "consumer", "native"));
    assert!(js.contains("C = 1;"), "{}", js);
  }

  #[test]
  fn own_legacy_handler_overrides_own_plugin_handler() {
    let ws = Workspace::new();
    ws.package(
      "mixed",
      r#"{"plugins": [{"name": "frag", "entry": "fragments"}], "legacy_extensions": {"frag": "javascript"}}"#,
      &[],
    );
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["mixed"], "files": ["c.frag"]}}"#,
      &[("c.frag", "// @export Mixed\nMixed = 1;\n")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let browser = resources(&library, "consumer", "browser");
    assert!(browser.iter().all(|r| r.kind == ResourceKind::Js));
    let js = linked_js(&browser);
    assert!(js.contains("Mixed = 1;"), "{}", js);
  }
}

mod failures {
  use super::*;

  /// Tries to emit a static asset and ignores the result.
  struct CarelessHandler;

  impl SourceHandler for CarelessHandler {
    fn compile(&self, step: &mut CompileStep<'_>) -> Result<(), HandlerError> {
      let size = step.input_size();
      let _ = step.add_asset("logo.png", size.to_le_bytes().to_vec());
      step.add_javascript("logo.js", "Logo = 1;");
      Ok(())
    }
  }

  #[test]
  fn handler_failure_names_the_file_and_package() {
    let ws = Workspace::new();
    ws.package(
      "shaky",
      r#"{"plugins": [{"name": "broken", "entry": "broken"}], "on_use": {"files": ["a.js", "oops.bad"]}}"#,
      &[("a.js", "A = 1;\n"), ("oops.bad", "???")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let slice = &library.get_slices(&UseSpec::new("shaky"), "native").unwrap()[0];
    let message = slice.compile(&library).unwrap_err().to_string();

    assert!(message.contains("oops.bad"), "{}", message);
    assert!(message.contains("shaky"), "{}", message);
    assert!(message.contains("syntax error on line 1"), "{}", message);
    assert!(!slice.slice().is_compiled());
  }

  #[test]
  fn document_sections_fail_on_native_targets() {
    let ws = Workspace::new();
    ws.package("frags", r#"{"plugins": [{"name": "frag", "entry": "fragments"}]}"#, &[]);
    ws.package(
      "site",
      r#"{"on_use": {"use": ["frags"], "files": ["page.frag"]}}"#,
      &[("page.frag", "<p>")],
    );
    let library = ws.library(core_env().with_catalog(extended_catalog()));

    let slice = &library.get_slices(&UseSpec::new("site"), "native").unwrap()[0];
    let message = slice.compile(&library).unwrap_err().to_string();
    assert!(message.contains("page.frag"), "{}", message);
    assert!(message.contains("browser targets"), "{}", message);

    assert!(library.get_slices(&UseSpec::new("site"), "browser").unwrap()[0].compile(&library).is_ok());
  }

  #[test]
  fn ignored_browser_only_errors_still_fail_the_slice() {
    let careless: Arc<dyn SourceHandler> = Arc::new(CarelessHandler);
    let catalog =
      PluginCatalog::builtin().with_plugin("careless", Arc::new(ExtensionPlugin::new([("img", careless)])));
    let ws = Workspace::new();
    ws.package(
      "assets",
      r#"{"plugins": [{"name": "img", "entry": "careless"}], "on_use": {"files": ["logo.img"]}}"#,
      &[("logo.img", "PNG")],
    );
    let library = ws.library(core_env().with_catalog(catalog));

    let native = &library.get_slices(&UseSpec::new("assets"), "native").unwrap()[0];
    let message = native.compile(&library).unwrap_err().to_string();
    assert!(message.contains("logo.img"), "{}", message);
    assert!(message.contains("static assets"), "{}", message);
    assert!(!native.slice().is_compiled());

    let browser = &library.get_slices(&UseSpec::new("assets"), "browser").unwrap()[0];
    assert!(browser.compile(&library).is_ok());
  }

  #[test]
  fn missing_source_file_is_a_read_error() {
    let ws = Workspace::new();
    ws.package("pkg", r#"{"on_use": {"files": ["ghost.js"]}}"#, &[]);
    let library = ws.library(core_env());

    let slice = &library.get_slices(&UseSpec::new("pkg"), "native").unwrap()[0];
    let message = slice.compile(&library).unwrap_err().to_string();
    assert!(message.contains("ghost.js"), "{}", message);
  }
}
