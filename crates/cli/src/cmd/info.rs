use anyhow::Result;

use unibuild_lib::consts::UNIPACKAGE_VERSION;
use unibuild_lib::env::BuildEnv;

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(format: OutputFormat) -> Result<()> {
  let env = BuildEnv::from_env();
  let plugins: Vec<&str> = env.catalog.plugin_names().collect();

  if format.is_json() {
    return print_json(&serde_json::json!({
      "version": env!("CARGO_PKG_VERSION"),
      "host_arch": env.host_arch,
      "core_package": env.core_package,
      "plugins": plugins,
      "unipackage_version": UNIPACKAGE_VERSION,
    }));
  }

  println!("System:");
  print_stat("Host architecture", &env.host_arch);
  print_stat("Core package", env.core_package.as_deref().unwrap_or("(none)"));
  print_stat("Plugins", &plugins.join(", "));
  print_stat("Unipackage format", UNIPACKAGE_VERSION);
  Ok(())
}
