//! Build resources emitted by slices.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of data a resource carries into a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
  /// Served as-is (images, fonts, unhandled browser files).
  Static,
  /// Fully linked JavaScript.
  Js,
  Css,
  /// Markup appended to the document `<head>`.
  Head,
  /// Markup appended to the document `<body>`.
  Body,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Js => "js",
      Self::Css => "css",
      Self::Head => "head",
      Self::Body => "body",
    }
  }

  /// Document fragments are concatenated into one payload per kind when persisted.
  pub fn is_document_section(&self) -> bool {
    matches!(self, Self::Head | Self::Body)
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One emitted build artifact.
///
/// `serve_path` is honored for `static`, sometimes for `css` and `js`, and
/// ignored for document sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  pub kind: ResourceKind,
  pub data: Vec<u8>,
  pub serve_path: Option<String>,
}

impl Resource {
  pub fn new(kind: ResourceKind, data: impl Into<Vec<u8>>, serve_path: Option<String>) -> Self {
    Self {
      kind,
      data: data.into(),
      serve_path,
    }
  }

  /// Payload interpreted as UTF-8, lossily.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.data).into_owned()
  }
}

/// Partially linked JavaScript produced by the first link phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrelinkFile {
  pub source: String,
  pub serve_path: Option<String>,
}
