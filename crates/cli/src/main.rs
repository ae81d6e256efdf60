mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// unibuild - build packages into linked, cacheable unipackages
#[derive(Parser)]
#[command(name = "unibuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a package directory (or an application) and save its unipackage
  Build {
    /// Package or application directory
    dir: PathBuf,

    /// Directory of packages the build may use
    #[arg(short, long)]
    packages: Option<PathBuf>,

    /// Package name (default: the directory name)
    #[arg(short, long)]
    name: Option<String>,

    /// Write the unipackage here instead of <dir>/.build
    #[arg(short, long)]
    out: Option<PathBuf>,
  },

  /// Check whether a unipackage is still up to date
  Check {
    /// Unipackage directory
    artifact: PathBuf,

    /// Source directory the unipackage should have been built from
    #[arg(short, long)]
    source: Option<PathBuf>,
  },

  /// List the linked resources of a package for one architecture
  Resources {
    /// Package spec: "pkg" or "pkg.slice"
    spec: String,

    /// Bundle architecture
    #[arg(short, long)]
    arch: String,

    /// Directory of packages
    #[arg(short, long)]
    packages: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show host architecture and engine configuration
  Info {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      dir,
      packages,
      name,
      out,
    } => cmd::cmd_build(&dir, packages.as_deref(), name.as_deref(), out.as_deref())?,
    Commands::Check { artifact, source } => {
      if !cmd::cmd_check(&artifact, source.as_deref())? {
        return Ok(ExitCode::FAILURE);
      }
    }
    Commands::Resources {
      spec,
      arch,
      packages,
      format,
    } => cmd::cmd_resources(&spec, &arch, &packages, format)?,
    Commands::Info { format } => cmd::cmd_info(format)?,
  }

  Ok(ExitCode::SUCCESS)
}
