//! Source discovery for application directories.

use std::path::Path;

use walkdir::WalkDir;

use crate::deps::WatchPattern;
use crate::util::paths::extension;

/// File names skipped by default: dotfiles, editor backups and lock files.
pub const DEFAULT_IGNORE: &[&str] = &[r"^\.", r"~$", r"^#.*#$"];

/// Finds source files under a root.
pub trait SourceScanner {
  /// Relative `/`-separated paths of files under `root` whose extension is in
  /// `extensions`, skipping any file or directory whose name matches `ignore`.
  fn scan(&self, root: &Path, extensions: &[String], ignore: &[WatchPattern]) -> Vec<String>;
}

/// Recursive walk in sorted order, with `.html` files moved to the front so
/// templates load before the code that refers to them.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkScanner;

impl SourceScanner for WalkScanner {
  fn scan(&self, root: &Path, extensions: &[String], ignore: &[WatchPattern]) -> Vec<String> {
    let ignored = |name: &str| ignore.iter().any(|pattern| pattern.is_match(name));

    let found: Vec<String> = WalkDir::new(root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|entry| entry.depth() == 0 || !ignored(&entry.file_name().to_string_lossy()))
      .flatten()
      .filter(|entry| entry.file_type().is_file())
      .filter_map(|entry| {
        let relative = entry.path().strip_prefix(root).ok()?;
        let relative = relative
          .components()
          .map(|c| c.as_os_str().to_string_lossy())
          .collect::<Vec<_>>()
          .join("/");
        extensions
          .iter()
          .any(|ext| ext == extension(&relative))
          .then_some(relative)
      })
      .collect();

    let (mut html, rest): (Vec<String>, Vec<String>) = found.into_iter().partition(|path| extension(path) == "html");
    html.extend(rest);
    html
  }
}

/// Compile the default ignore list.
pub fn default_ignore() -> Vec<WatchPattern> {
  DEFAULT_IGNORE
    .iter()
    .filter_map(|pattern| WatchPattern::new(pattern).ok())
    .collect()
}
