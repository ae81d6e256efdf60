//! Two-phase JavaScript linking.
//!
//! Phase one ([`prelink`]) shapes a slice's own modules without looking at
//! any other package: it collects exports, wraps bodies for named packages
//! and leaves a boundary token where imports belong. Phase two ([`link`])
//! runs once a bundle has picked concrete dependency slices and replaces the
//! boundary with bindings for every imported symbol.
//!
//! # Module shape
//!
//! A named package is linked into one file:
//!
//! ```text
//! (function () {
//!
//! $${imports:0123456789abcdef}
//!
//! /* Package-scope variables */
//! var A;
//!
//! ///////////////// /packages/pkg/a.js /////////////////
//! A = 1;
//!
//! /* Exports */
//! if (typeof Package === 'undefined') Package = {};
//! Package["pkg"] = {
//!   A: A
//! };
//!
//! })();
//! ```
//!
//! The application shares one global namespace: each body stays its own
//! file and the boundary lives in a separate import stub.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::consts::{BOUNDARY_HASH_LEN, IMPORT_STUB_SERVE_PATH};
use crate::resource::PrelinkFile;

static EXPORT_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?m)^\s*//\s*@export\s+(.+?)\s*;?\s*$").expect("export directive pattern is valid")
});

static SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$").expect("symbol pattern is valid")
});

/// One JavaScript module body emitted by a source handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsInput {
  pub source: String,
  pub serve_path: String,
}

/// Inputs to [`prelink`].
#[derive(Debug, Clone, Copy)]
pub struct PrelinkOptions<'a> {
  pub inputs: &'a [JsInput],
  /// Link as the application: no wrapper, one global namespace.
  pub use_global_namespace: bool,
  /// Package name, used for the export block of wrapped output.
  pub name: Option<&'a str>,
  /// Serve path of the combined file for wrapped output.
  pub combined_serve_path: &'a str,
  /// Symbols exported even without an `@export` directive.
  pub force_export: &'a [String],
}

/// Phase-one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prelinked {
  pub boundary: String,
  pub files: Vec<PrelinkFile>,
  pub exports: Vec<String>,
}

/// Inputs to [`link`].
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions<'a> {
  pub use_global_namespace: bool,
  pub prelinked: &'a [PrelinkFile],
  pub boundary: &'a str,
  /// Imported symbol to the name of the package providing it.
  pub imports: &'a BTreeMap<String, String>,
}

/// Phase-two output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedFile {
  pub source: String,
  pub serve_path: Option<String>,
}

/// Shape a slice's own modules and compute its exports.
pub fn prelink(options: PrelinkOptions<'_>) -> Prelinked {
  let exports = collect_exports(options.inputs, options.force_export);
  let boundary = boundary_token(&options);

  let files = if options.use_global_namespace {
    let mut files = vec![PrelinkFile {
      source: format!("{}\n", boundary),
      serve_path: Some(IMPORT_STUB_SERVE_PATH.to_string()),
    }];
    files.extend(options.inputs.iter().map(|input| PrelinkFile {
      source: input.source.clone(),
      serve_path: Some(input.serve_path.clone()),
    }));
    files
  } else if options.inputs.is_empty() && exports.is_empty() {
    Vec::new()
  } else {
    vec![PrelinkFile {
      source: wrap_package(&options, &boundary, &exports),
      serve_path: Some(options.combined_serve_path.to_string()),
    }]
  };

  debug!(
    package = options.name.unwrap_or("(app)"),
    inputs = options.inputs.len(),
    exports = exports.len(),
    "prelinked"
  );

  Prelinked {
    boundary,
    files,
    exports,
  }
}

/// Replace the boundary in every prelinked file with import bindings.
///
/// An import stub left empty by the substitution is dropped.
pub fn link(options: LinkOptions<'_>) -> Vec<LinkedFile> {
  let bindings = import_bindings(options.imports, options.use_global_namespace);
  let mut linked = Vec::with_capacity(options.prelinked.len());

  for file in options.prelinked {
    let is_stub = file.source.trim() == options.boundary;
    if is_stub && bindings.is_empty() {
      continue;
    }
    linked.push(LinkedFile {
      source: file.source.replace(options.boundary, bindings.trim_end()),
      serve_path: file.serve_path.clone(),
    });
  }

  linked
}

fn collect_exports(inputs: &[JsInput], force_export: &[String]) -> Vec<String> {
  let mut seen = BTreeSet::new();
  let mut exports = Vec::new();

  let declared = inputs.iter().flat_map(|input| {
    EXPORT_DIRECTIVE
      .captures_iter(&input.source)
      .filter_map(|caps| caps.get(1))
      .flat_map(|list| list.as_str().split(',').map(str::trim).map(str::to_string).collect::<Vec<_>>())
  });

  for symbol in declared.chain(force_export.iter().cloned()) {
    if !SYMBOL.is_match(&symbol) {
      debug!(symbol = %symbol, "ignoring malformed export");
      continue;
    }
    if seen.insert(symbol.clone()) {
      exports.push(symbol);
    }
  }

  exports
}

/// Top-level names bound by a list of possibly dotted symbols.
fn root_names<'a>(symbols: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
  let mut seen = BTreeSet::new();
  symbols
    .into_iter()
    .map(|symbol| symbol.split('.').next().unwrap_or(symbol))
    .filter(|root| seen.insert(*root))
    .collect()
}

fn boundary_token(options: &PrelinkOptions<'_>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(options.name.unwrap_or("").as_bytes());
  hasher.update([0, u8::from(options.use_global_namespace)]);
  for input in options.inputs {
    hasher.update(input.serve_path.as_bytes());
    hasher.update([0]);
    hasher.update(input.source.as_bytes());
    hasher.update([0]);
  }
  for symbol in options.force_export {
    hasher.update(symbol.as_bytes());
    hasher.update([0]);
  }
  let digest = format!("{:x}", hasher.finalize());
  format!("$${{imports:{}}}", &digest[..BOUNDARY_HASH_LEN])
}

fn wrap_package(options: &PrelinkOptions<'_>, boundary: &str, exports: &[String]) -> String {
  let roots = root_names(exports);
  let mut out = String::new();

  out.push_str("(function () {\n\n");
  let _ = writeln!(out, "{}\n", boundary);

  if !roots.is_empty() {
    let _ = writeln!(out, "/* Package-scope variables */\nvar {};\n", roots.join(", "));
  }

  for input in options.inputs {
    let _ = writeln!(out, "///////////////// {} /////////////////", input.serve_path);
    out.push_str(&input.source);
    if !input.source.ends_with('\n') {
      out.push('\n');
    }
    out.push('\n');
  }

  out.push_str("/* Exports */\n");
  out.push_str("if (typeof Package === 'undefined') Package = {};\n");
  let name = options.name.unwrap_or("");
  if roots.is_empty() {
    let _ = writeln!(out, "Package[\"{}\"] = {{}};", name);
  } else {
    let _ = writeln!(out, "Package[\"{}\"] = {{", name);
    let entries: Vec<String> = roots.iter().map(|root| format!("  {}: {}", root, root)).collect();
    let _ = writeln!(out, "{}\n}};", entries.join(",\n"));
  }

  out.push_str("\n})();\n");
  out
}

fn import_bindings(imports: &BTreeMap<String, String>, global: bool) -> String {
  let mut roots: BTreeMap<&str, &str> = BTreeMap::new();
  for (symbol, package) in imports {
    let root = symbol.split('.').next().unwrap_or(symbol);
    roots.insert(root, package);
  }

  let keyword = if global { "" } else { "var " };
  let mut out = String::new();
  for (root, package) in roots {
    let _ = writeln!(out, "{}{} = Package[\"{}\"].{};", keyword, root, package, root);
  }
  out
}
