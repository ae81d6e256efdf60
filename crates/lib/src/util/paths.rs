//! Path helpers for package-relative source paths and serve paths.
//!
//! Source paths are relative to a package root and must never escape it.
//! Serve paths are `/`-separated URL-like paths (`/packages/foo/bar.js`).

use std::path::{Component, Path};

/// Normalize a package-relative path, resolving `.` and `..` without touching
/// the filesystem.
///
/// Returns `None` if the path is absolute or climbs above its root.
pub fn normalize_relative(path: &str) -> Option<String> {
  let mut parts: Vec<String> = Vec::new();

  for component in Path::new(path).components() {
    match component {
      Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
      Component::CurDir => {}
      Component::ParentDir => {
        parts.pop()?;
      }
      Component::RootDir | Component::Prefix(_) => return None,
    }
  }

  if parts.is_empty() {
    return None;
  }

  Some(parts.join("/"))
}

/// True if a path read back from a stored manifest tries to reach a parent
/// directory.
pub fn has_parent_reference(path: &str) -> bool {
  path.contains("..")
}

/// Join a serve root (`/packages/foo`) and a relative path.
pub fn join_serve_path(root: &str, relative: &str) -> String {
  let root = root.trim_end_matches('/');
  let relative = relative.trim_start_matches('/');
  format!("{}/{}", root, relative)
}

/// Turn a serve path into a relative file path usable inside an artifact.
///
/// Leading separators are stripped and `..` segments dropped.
pub fn serve_path_to_file(serve_path: &str) -> String {
  serve_path
    .split(['/', '\\'])
    .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
    .collect::<Vec<_>>()
    .join("/")
}

/// The extension of a path without its leading dot, or an empty string.
pub fn extension(path: &str) -> &str {
  let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
  match file_name.rfind('.') {
    Some(idx) if idx > 0 => &file_name[idx + 1..],
    _ => "",
  }
}
