//! Compiling slices and resolving imports across packages.

use std::sync::Arc;

use unibuild_lib::consts::IMPORT_STUB_SERVE_PATH;
use unibuild_lib::package::Package;
use unibuild_lib::resource::ResourceKind;
use unibuild_lib::scanner::WalkScanner;
use unibuild_lib::slice::UseSpec;

use super::common::{Workspace, core_env, linked_js, resources, write};

mod end_to_end {
  use super::*;

  #[test]
  fn dependent_package_resolves_exported_symbol() {
    let ws = Workspace::new();
    ws.package(
      "pkgA",
      r#"{"on_use": {"files": ["a.js"]}}"#,
      &[("a.js", "// @export A\nA = function () { return 'a'; };\n")],
    );
    ws.package(
      "pkgB",
      r#"{"on_use": {"use": ["pkgA"], "files": ["b.js"]}}"#,
      &[("b.js", "console.log(A());\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "pkgB", "native"));

    assert!(js.contains("var A = Package[\"pkgA\"].A;"), "{}", js);
    assert!(js.contains("console.log(A());"), "{}", js);
    assert!(!js.contains("$${imports:"), "{}", js);
  }

  #[test]
  fn exporting_package_publishes_its_symbols() {
    let ws = Workspace::new();
    ws.package(
      "pkgA",
      r#"{"on_use": {"files": ["a.js"], "export": ["Extra"]}}"#,
      &[("a.js", "// @export A\nA = 1; Extra = 2;\n")],
    );
    let library = ws.library(core_env());

    let slices = library.get_slices(&UseSpec::new("pkgA"), "native").unwrap();
    assert_eq!(slices[0].exports(&library).unwrap(), vec!["A", "Extra"]);

    let js = linked_js(&resources(&library, "pkgA", "native"));
    assert!(js.contains("Package[\"pkgA\"] = {\n  A: A,\n  Extra: Extra\n};"), "{}", js);
  }
}

mod import_resolution {
  use super::*;

  fn exporter(ws: &Workspace, name: &str) {
    ws.package(
      name,
      r#"{"on_use": {"files": ["x.js"]}}"#,
      &[("x.js", "// @export Foo\nFoo = 1;\n")],
    );
  }

  #[test]
  fn later_declared_use_wins() {
    let ws = Workspace::new();
    exporter(&ws, "first");
    exporter(&ws, "second");
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["first", "second"], "files": ["c.js"]}}"#,
      &[("c.js", "Foo;\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "consumer", "native"));
    assert!(js.contains("var Foo = Package[\"second\"].Foo;"), "{}", js);
    assert!(!js.contains("Package[\"first\"]"), "{}", js);
  }

  #[test]
  fn reversing_declaration_order_reverses_the_winner() {
    let ws = Workspace::new();
    exporter(&ws, "first");
    exporter(&ws, "second");
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["second", "first"], "files": ["c.js"]}}"#,
      &[("c.js", "Foo;\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "consumer", "native"));
    assert!(js.contains("var Foo = Package[\"first\"].Foo;"), "{}", js);
  }

  #[test]
  fn unordered_uses_contribute_no_imports() {
    let ws = Workspace::new();
    exporter(&ws, "cyclic");
    ws.package(
      "consumer",
      r#"{"on_use": {"use": [{"spec": "cyclic", "unordered": true}], "files": ["c.js"]}}"#,
      &[("c.js", "Foo;\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "consumer", "native"));
    assert!(!js.contains("Package[\"cyclic\"].Foo"), "{}", js);
    assert!(!js.contains("$${imports:"), "{}", js);
  }

  #[test]
  fn named_slice_use_links_only_that_slice() {
    let ws = Workspace::new();
    ws.package(
      "lib",
      r#"{"on_use": {"files": ["m.js"]}, "on_test": {"files": ["t.js"]}}"#,
      &[("m.js", "// @export Main\nMain = 1;\n"), ("t.js", "// @export Helper\nHelper = 1;\n")],
    );
    ws.package(
      "consumer",
      r#"{"on_use": {"use": ["lib.tests"], "files": ["c.js"]}}"#,
      &[("c.js", "Helper;\n")],
    );
    let library = ws.library(core_env());

    let js = linked_js(&resources(&library, "consumer", "native"));
    assert!(js.contains("var Helper = Package[\"lib\"].Helper;"), "{}", js);
    assert!(!js.contains("var Main"), "{}", js);
  }
}

mod compilation {
  use super::*;

  #[test]
  fn compiling_twice_is_identical_to_compiling_once() {
    let ws = Workspace::new();
    ws.package(
      "pkg",
      r#"{"on_use": {"files": ["a.js", "b.css", "logo.png"]}}"#,
      &[("a.js", "// @export A\nA = 1;\n"), ("b.css", "p {}"), ("logo.png", "PNG")],
    );
    let library = ws.library(core_env());
    let slice = &library.get_slices(&UseSpec::new("pkg"), "browser").unwrap()[0];

    let first = slice.compile(&library).unwrap();
    let second = slice.compile(&library).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.exports, vec!["A"]);
    assert_eq!(first.dependency_info.files.len(), 4);
    assert_eq!(
      slice.get_resources("browser", &library).unwrap(),
      slice.get_resources("browser", &library).unwrap()
    );
  }

  #[test]
  fn unhandled_files_are_static_on_browser_and_dropped_on_native() {
    let ws = Workspace::new();
    ws.package(
      "pkg",
      r#"{"on_use": {"files": ["logo.png", "style.css"]}}"#,
      &[("logo.png", "PNG"), ("style.css", "p {}")],
    );
    let library = ws.library(core_env());

    let browser = resources(&library, "pkg", "browser");
    let kinds: Vec<_> = browser.iter().map(|r| (r.kind, r.serve_path.clone())).collect();
    assert_eq!(
      kinds,
      vec![
        (ResourceKind::Static, Some("/packages/pkg/logo.png".to_string())),
        (ResourceKind::Css, Some("/packages/pkg/style.css".to_string())),
      ]
    );

    let native = resources(&library, "pkg", "native");
    assert!(native.is_empty(), "{:?}", native);

    let slice = &library.get_slices(&UseSpec::new("pkg"), "native").unwrap()[0];
    assert_eq!(slice.compile(&library).unwrap().dependency_info.files.len(), 3);
  }

  #[test]
  fn bundle_arch_must_satisfy_slice_arch() {
    let ws = Workspace::new();
    ws.package("pkg", "{}", &[]);
    let library = ws.library(core_env());
    let slice = &library.get_slices(&UseSpec::new("pkg"), "browser").unwrap()[0];

    let err = slice.get_resources("native", &library).unwrap_err();
    assert!(err.to_string().contains("does not support"), "{}", err);
  }

  #[test]
  fn slice_for_generic_native_serves_specific_bundles() {
    let ws = Workspace::new();
    ws.package(
      "pkg",
      r#"{"on_use": {"files": ["a.js"]}}"#,
      &[("a.js", "A = 1;\n")],
    );
    let library = ws.library(core_env());

    let slices = library.get_slices(&UseSpec::new("pkg"), "native.linux.x86_64").unwrap();
    assert_eq!(slices[0].slice().arch, "native");
    assert!(!slices[0].get_resources("native.linux.x86_64", &library).unwrap().is_empty());
  }

  #[test]
  fn unknown_dependency_fails_resolution() {
    let ws = Workspace::new();
    ws.package(
      "pkg",
      r#"{"on_use": {"use": ["missing"], "files": ["a.js"]}}"#,
      &[("a.js", "A = 1;\n")],
    );
    let library = ws.library(core_env());
    let slice = &library.get_slices(&UseSpec::new("pkg"), "native").unwrap()[0];

    let err = slice.compile(&library).unwrap_err();
    assert!(err.to_string().contains("missing"), "{}", err);
  }
}

mod application {
  use super::*;

  #[test]
  fn app_links_into_global_namespace() {
    let ws = Workspace::new();
    ws.package(
      "pkgA",
      r#"{"on_use": {"files": ["a.js"]}}"#,
      &[("a.js", "// @export A\nA = 1;\n")],
    );
    let library = ws.library(core_env());

    let app_dir = ws.root().join("app");
    write(&app_dir, ".unibuild/packages", "# used packages\npkgA\n");
    write(&app_dir, "client/main.js", "console.log(A);\n");
    write(&app_dir, "server/main.js", "serve(A);\n");
    write(&app_dir, "shared.js", "Shared = 1;\n");
    write(&app_dir, "client/style.css", "p {}");
    write(&app_dir, "tests/t.js", "never();\n");

    let app = Package::from_app_dir(&app_dir, &library, library.env(), &WalkScanner).unwrap();
    let client = app.get_single_slice("client", "browser").unwrap();
    assert_eq!(client.sources(), vec!["client/main.js", "client/style.css", "shared.js"]);
    let server = app.get_single_slice("server", "native").unwrap();
    assert_eq!(server.sources(), vec!["server/main.js", "shared.js"]);
    assert_eq!(client.uses, vec![UseSpec::new("core"), UseSpec::new("pkgA")]);

    let resources = client.get_resources("browser", &app, &library).unwrap();
    let stub = resources
      .iter()
      .find(|r| r.serve_path.as_deref() == Some(IMPORT_STUB_SERVE_PATH))
      .unwrap();
    assert_eq!(stub.text(), "A = Package[\"pkgA\"].A;\n");

    let main = resources
      .iter()
      .find(|r| r.serve_path.as_deref() == Some("/client/main.js"))
      .unwrap();
    assert_eq!(main.text(), "console.log(A);\n");
    assert!(!resources.iter().any(|r| r.text().contains("(function ()")));
  }

  #[test]
  fn app_without_imports_has_no_stub() {
    let ws = Workspace::new();
    let library = ws.library(core_env());
    let app_dir = ws.root().join("app");
    write(&app_dir, "client/main.js", "go();\n");

    let app = Package::from_app_dir(&app_dir, &library, library.env(), &WalkScanner).unwrap();
    let client = app.get_single_slice("client", "browser").unwrap();
    let resources = client.get_resources("browser", &app, &library).unwrap();

    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].serve_path.as_deref(), Some("/client/main.js"));
  }
}
