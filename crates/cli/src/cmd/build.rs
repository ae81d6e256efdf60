//! Implementation of the `unibuild build` command.
//!
//! A directory holding a `package.json` is built as a package and saved as a
//! unipackage. Any other directory is built as an application: its client
//! and server slices are compiled and linked, and a summary is printed.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use unibuild_lib::consts::{BROWSER_ARCH, BUILD_DIR, CLIENT_SLICE, NATIVE_ARCH, PACKAGE_DESCRIPTOR, SERVER_SLICE};
use unibuild_lib::env::BuildEnv;
use unibuild_lib::library::Library;
use unibuild_lib::package::Package;
use unibuild_lib::scanner::WalkScanner;
use unibuild_lib::store::{self, SaveOptions, summarize};

use crate::output::{format_bytes, print_info, print_stat, print_success, print_warning, symbols};

pub fn cmd_build(dir: &Path, packages: Option<&Path>, name: Option<&str>, out: Option<&Path>) -> Result<()> {
  let root = dunce::canonicalize(dir).with_context(|| format!("No such directory: {}", dir.display()))?;

  let mut library = Library::new(BuildEnv::from_env());
  if let Some(packages) = packages {
    let loaded = library
      .load_tree(packages)
      .with_context(|| format!("Failed to load packages from {}", packages.display()))?;
    info!(count = loaded.len(), "loaded package tree");
  }

  if !root.join(PACKAGE_DESCRIPTOR).is_file() {
    if out.is_some() {
      bail!("Applications can not be saved as unipackages (no {} in {})", PACKAGE_DESCRIPTOR, root.display());
    }
    return build_app(&root, &library);
  }

  let name = match name {
    Some(name) => name.to_string(),
    None => root
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .context("Can not derive a package name from the directory; pass --name")?,
  };

  let package = match library.get(&name) {
    Ok(package) => package,
    Err(_) => library
      .load_package(&name, &root)
      .with_context(|| format!("Failed to load package {}", name))?,
  };

  match out {
    Some(out) => {
      let written = store::save(
        &package,
        &library,
        out,
        SaveOptions {
          build_of_path: Some(&root),
        },
      )
      .with_context(|| format!("Failed to build {}", name))?;
      print_success(&format!("Built {} {} {}", name, symbols::ARROW, written.display()));
    }
    None if package.source_root.is_none() => {
      print_info(&format!("{} is up to date ({})", name, root.join(BUILD_DIR).display()));
      library.save_built().context("Failed to save rebuilt packages")?;
    }
    None => {
      let written = library.save_built().context("Failed to save unipackages")?;
      for path in &written {
        print_success(&format!("Built {}", path.display()));
      }
      if !written.contains(&root.join(BUILD_DIR)) {
        print_warning(&format!("{} was built but could not be saved", name));
      }
    }
  }

  for slice in &package.slices {
    let compiled = slice.compile(&package, &library)?;
    print_stat(
      &slice.to_string(),
      &format!("{} exports, {} resources", compiled.exports.len(), compiled.resources.len()),
    );
  }

  Ok(())
}

fn build_app(root: &Path, library: &Library) -> Result<()> {
  let app = Package::from_app_dir(root, library, library.env(), &WalkScanner)
    .with_context(|| format!("Failed to read application in {}", root.display()))?;

  for (slice_name, arch) in [(CLIENT_SLICE, BROWSER_ARCH), (SERVER_SLICE, NATIVE_ARCH)] {
    let slice = app.get_single_slice(slice_name, arch)?;
    let resources = slice
      .get_resources(arch, &app, library)
      .with_context(|| format!("Failed to build the {} slice", slice_name))?;
    let bytes: usize = resources.iter().map(|r| r.data.len()).sum();

    print_success(&format!("Built {} ({} sources)", slice, slice.sources().len()));
    for (kind, count) in summarize(&resources) {
      print_stat(kind, &count.to_string());
    }
    print_stat("size", &format_bytes(bytes as u64));
  }

  Ok(())
}
