use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use unibuild_lib::env::BuildEnv;
use unibuild_lib::handler::{CompileStep, HandlerError, Section, SourceHandler};
use unibuild_lib::library::Library;
use unibuild_lib::plugin::{ExtensionPlugin, PluginCatalog};
use unibuild_lib::resource::{Resource, ResourceKind};
use unibuild_lib::slice::UseSpec;

/// Description of the package every slice implicitly uses. It only provides
/// the builtin JavaScript and stylesheet handlers.
pub const CORE_DESCRIPTOR: &str = r#"{
  "summary": "core environment",
  "plugins": [
    { "name": "js", "entry": "javascript" },
    { "name": "css", "entry": "stylesheet" }
  ]
}"#;

/// A temporary directory holding package source trees.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    let workspace = Self {
      temp: TempDir::new().unwrap(),
    };
    workspace.package("core", CORE_DESCRIPTOR, &[]);
    workspace
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  /// Write a package directory with a descriptor and source files.
  pub fn package(&self, name: &str, descriptor: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = self.root().join("packages").join(name);
    write(&dir, "package.json", descriptor);
    for (path, contents) in files {
      write(&dir, path, contents);
    }
    dir
  }

  pub fn package_dir(&self, name: &str) -> PathBuf {
    self.root().join("packages").join(name)
  }

  /// A library with every package in the workspace loaded.
  pub fn library(&self, env: BuildEnv) -> Library {
    let mut library = Library::new(env);
    library.load_tree(&self.root().join("packages")).unwrap();
    library
  }
}

pub fn write(root: &Path, relative: &str, contents: &str) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, contents).unwrap();
}

pub fn core_env() -> BuildEnv {
  BuildEnv::default().with_core_package("core")
}

/// Linked resources of a package's default slices.
pub fn resources(library: &Library, package: &str, arch: &str) -> Vec<Resource> {
  library
    .get_slices(&UseSpec::new(package), arch)
    .unwrap()
    .iter()
    .flat_map(|slice| slice.get_resources(arch, library).unwrap())
    .collect()
}

/// Concatenated source of every linked JavaScript resource.
pub fn linked_js(resources: &[Resource]) -> String {
  resources
    .iter()
    .filter(|r| r.kind == ResourceKind::Js)
    .map(Resource::text)
    .collect::<Vec<_>>()
    .join("\n")
}

/// Splits `.frag` files into head and body fragments at a `---` line.
pub struct FragmentHandler;

impl SourceHandler for FragmentHandler {
  fn compile(&self, step: &mut CompileStep<'_>) -> Result<(), HandlerError> {
    let text = step.read_to_string()?;
    let (head, body) = text.split_once("---\n").unwrap_or((text.as_str(), ""));
    step.append_document(Section::Head, head)?;
    step.append_document(Section::Body, body)?;
    Ok(())
  }
}

/// Always fails.
pub struct BrokenHandler;

impl SourceHandler for BrokenHandler {
  fn compile(&self, _step: &mut CompileStep<'_>) -> Result<(), HandlerError> {
    Err(HandlerError::Failed("syntax error on line 1".to_string()))
  }
}

/// Builtin catalog plus a `fragments` plugin (`.frag`) and a `broken`
/// plugin (`.bad`).
pub fn extended_catalog() -> PluginCatalog {
  let fragments: Arc<dyn SourceHandler> = Arc::new(FragmentHandler);
  let broken: Arc<dyn SourceHandler> = Arc::new(BrokenHandler);
  PluginCatalog::builtin()
    .with_plugin("fragments", Arc::new(ExtensionPlugin::new([("frag", fragments)])))
    .with_plugin("broken", Arc::new(ExtensionPlugin::new([("bad", broken)])))
}
