//! Integration tests for compiling, linking and persisting packages.

mod common;
mod handler_tests;
mod linking_tests;
mod unipackage_tests;
