//! Architecture specifiers and matching.
//!
//! An architecture is a dot-separated string read most-general-first, such as
//! `browser`, `native` or `native.linux.x86_64`. A requirement is satisfied by
//! a candidate when the requirement's segments are a prefix of (or equal to)
//! the candidate's segments.

mod host;

pub use host::{Cpu, Os, native_arch};

use crate::consts::{BROWSER_ARCH, NATIVE_ARCH};

/// True if `candidate` satisfies `requirement`.
///
/// `matches("native.linux.x86_64", "native")` is true;
/// `matches("native.darwin", "native.linux")` is false.
pub fn matches(candidate: &str, requirement: &str) -> bool {
  let mut candidate_segments = candidate.split('.');
  requirement
    .split('.')
    .all(|segment| candidate_segments.next() == Some(segment))
}

/// Among `candidates` usable for the requested arch, return the one with the
/// most segments. Ties keep the first one seen.
///
/// A slice built for `native` is usable by a bundle targeting
/// `native.linux.x86_64`, so each candidate is checked as a prefix of the
/// requested arch.
pub fn most_specific<'a, I>(requirement: &str, candidates: I) -> Option<&'a str>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut best: Option<&'a str> = None;
  for candidate in candidates {
    if !matches(requirement, candidate) {
      continue;
    }
    let better = match best {
      Some(current) => segment_count(candidate) > segment_count(current),
      None => true,
    };
    if better {
      best = Some(candidate);
    }
  }
  best
}

/// True for architectures that can carry document, stylesheet and asset output.
pub fn is_browser(arch: &str) -> bool {
  matches(arch, BROWSER_ARCH)
}

/// The fully qualified architecture of the running host, or `native` if the
/// platform is not one we name explicitly.
pub fn host() -> String {
  match (Os::current(), Cpu::current()) {
    (Some(os), Some(cpu)) => native_arch(os, cpu),
    _ => NATIVE_ARCH.to_string(),
  }
}

fn segment_count(arch: &str) -> usize {
  arch.split('.').count()
}
