//! mptcp-installer library
//!
//! Idempotent, resumable installation of the multipath-tcp kernel packages
//! published on the project's release page.

pub mod artifact;
pub mod bootloader;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod http;
pub mod install_state;
pub mod orchestrator;
pub mod progress;
pub mod sanity;

// Re-export main types for convenience
pub use artifact::{Artifact, ArtifactClass, Classification, classify};
pub use bootloader::{BootEntry, BootloaderSelector, find_boot_entry};
pub use catalog::{Release, ReleaseVersion, latest_release};
pub use config::InstallerConfig;
pub use error::{InstallerError, Result};
pub use host::{BootloaderHost, Dpkg, Grub, PackageInstaller};
pub use http::{GithubReleases, ReleaseSource, RetryPolicy};
pub use install_state::{InstallStage, InstallTransitionError, RunContext};
pub use orchestrator::{InstallPlan, InstallReport, Orchestrator, RunOutcome, UpdateCheck};
pub use progress::{ProgressRecord, ProgressStore};
