/// CLI argument parsing

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built: ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "volback")]
#[command(version = VERSION_WITH_BUILD, long_about = None)]
#[command(about = "Back up, rotate and restore Docker volumes")]
#[command(group(ArgGroup::new("mode").args(["interactive", "restore", "configure"])))]
pub struct Cli {
    /// Pick the volumes to back up from the ones currently in use
    #[arg(short, long)]
    pub interactive: bool,

    /// Restore a volume from an existing archive
    #[arg(short, long)]
    pub restore: bool,

    /// Edit the backup configuration
    #[arg(short, long)]
    pub configure: bool,

    /// Use an alternate configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
