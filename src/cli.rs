use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// mptcp-installer - keep the multipath-tcp kernel up to date
#[derive(Parser, Debug)]
#[command(name = "mptcp-installer")]
#[command(about = "Install the latest multipath-tcp kernel release and make it the boot default")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (flags and environment override its values)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the progress file and downloaded packages
    #[arg(long, env = "ROOT_DIR", global = true)]
    pub root_dir: Option<PathBuf>,

    /// Release listing page of the kernel project
    #[arg(long, global = true)]
    pub release_url: Option<String>,

    /// Generated GRUB menu to search for the new kernel's entry
    #[arg(long, global = true)]
    pub grub_cfg: Option<PathBuf>,

    /// GRUB defaults file to switch to the saved entry
    #[arg(long, global = true)]
    pub grub_default: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Download, install and boot the latest release (default)
    Install {
        /// Skip the root and required-binaries checks
        #[arg(long)]
        skip_preflight: bool,
    },
    /// Show the installed baseline and recorded packages
    Status,
    /// Report whether a newer release is available, without changing anything
    Check,
    /// Validate a configuration file
    ValidateConfig {
        /// Path to configuration file to validate
        file: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; `install` when none was given
    pub fn action(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Install {
            skip_preflight: false,
        })
    }
}
