//! Implementation of the `unibuild resources` command.
//!
//! Loads a package tree, resolves a spec for one bundle architecture and
//! prints every linked resource the bundle would receive.

use std::path::Path;

use anyhow::{Context, Result};

use unibuild_lib::env::BuildEnv;
use unibuild_lib::library::Library;
use unibuild_lib::slice::UseSpec;
use unibuild_lib::store::summarize;

use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_stat, symbols};

pub fn cmd_resources(spec: &str, arch: &str, packages: &Path, format: OutputFormat) -> Result<()> {
  let mut library = Library::new(BuildEnv::from_env());
  library
    .load_tree(packages)
    .with_context(|| format!("Failed to load packages from {}", packages.display()))?;

  let spec = UseSpec::parse(spec, false)?;
  let mut resources = Vec::new();
  for slice in library.get_slices(&spec, arch)? {
    let linked = slice
      .get_resources(arch, &library)
      .with_context(|| format!("Failed to link {} for {}", spec, arch))?;
    resources.extend(linked);
  }

  if format.is_json() {
    let items: Vec<_> = resources
      .iter()
      .map(|r| serde_json::json!({ "kind": r.kind, "servePath": r.serve_path, "length": r.data.len() }))
      .collect();
    print_json(&serde_json::json!({ "spec": spec.to_string(), "arch": arch, "resources": items }))?;
    return Ok(());
  }

  print_info(&format!("{} for {}: {} resource(s)", spec, arch, resources.len()));
  for resource in &resources {
    println!(
      "  {} {:<6} {} ({})",
      symbols::INFO,
      resource.kind.as_str(),
      resource.serve_path.as_deref().unwrap_or("-"),
      format_bytes(resource.data.len() as u64)
    );
  }
  println!();
  for (kind, count) in summarize(&resources) {
    print_stat(kind, &count.to_string());
  }

  Ok(())
}
