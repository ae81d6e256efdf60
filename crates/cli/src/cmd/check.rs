//! Implementation of the `unibuild check` command.

use std::path::Path;

use anyhow::{Context, Result};

use unibuild_lib::deps::Freshness;
use unibuild_lib::store;

use crate::output::{print_error, print_success};

/// Returns whether the unipackage in `artifact` is up to date.
pub fn cmd_check(artifact: &Path, source: Option<&Path>) -> Result<bool> {
  let source = source
    .map(|s| dunce::canonicalize(s).with_context(|| format!("No such directory: {}", s.display())))
    .transpose()?;

  let freshness = store::check(artifact, source.as_deref())
    .with_context(|| format!("Failed to read unipackage in {}", artifact.display()))?;

  match freshness {
    Freshness::UpToDate => {
      print_success(&format!("{} is up to date", artifact.display()));
      Ok(true)
    }
    Freshness::Stale(reason) => {
      print_error(&format!("{} is stale: {}", artifact.display(), reason));
      Ok(false)
    }
  }
}
