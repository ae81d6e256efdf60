//! unibuild-lib: a package-oriented build engine.
//!
//! Packages are compiled into architecture-specific slices, linked against
//! the exports of the packages they use, and persisted as relocatable
//! unipackages that later builds reuse while their sources are unchanged.
//!
//! - [`package::Package`]: a named bundle of slices and plugins
//! - [`slice::Slice`]: one (package, name, arch) compilation unit
//! - [`linker`]: prelink and link, the two linking phases
//! - [`store`]: unipackage save, load and staleness checks
//! - [`library::Library`]: the packages visible to one build

pub mod arch;
pub mod consts;
pub mod deps;
pub mod env;
pub mod error;
pub mod handler;
pub mod library;
pub mod linker;
pub mod npm;
pub mod package;
pub mod plugin;
pub mod resource;
pub mod scanner;
pub mod slice;
pub mod store;
pub mod util;

pub use error::{Error, Result};
