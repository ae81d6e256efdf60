//! Shared utilities.
//!
//! Common utilities used across the crate including hashing and path checks.

pub mod hash;
pub mod paths;
