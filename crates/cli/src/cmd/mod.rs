mod build;
mod check;
mod info;
mod resources;

pub use build::cmd_build;
pub use check::cmd_check;
pub use info::cmd_info;
pub use resources::cmd_resources;
