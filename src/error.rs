//! Error handling module for the installer
//!
//! Every failure the installer can hit is normalised into [`InstallerError`].
//! Transport and process errors are converted at the collaborator boundary
//! (`http`, `host`) so the orchestrator only ever sees this taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::ArtifactClass;
use crate::install_state::InstallTransitionError;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// The release page no longer looks the way the scraper expects
    #[error("Release page format not recognised ({0}); please update the crawler")]
    CatalogFormat(String),

    /// The release ships a file the installer does not understand
    #[error("Unknown file in release: {filename}")]
    UnknownFile { filename: String },

    /// A kernel image whose name does not carry a kernel version
    #[error("Cannot extract kernel version from {filename}")]
    KernelVersionExtraction { filename: String },

    /// Two assets of one class in the same release
    #[error("Release lists more than one {class} package: {first} and {second}")]
    DuplicateArtifact {
        class: ArtifactClass,
        first: String,
        second: String,
    },

    /// No kernel image among the release assets
    #[error("Release {version} has no kernel image package")]
    MissingKernelImage { version: String },

    /// Non-success HTTP status
    #[error("Request to {url} failed with status {status}: {body}")]
    Request {
        url: String,
        status: u16,
        body: String,
    },

    /// Transport-level HTTP failure after retries
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Host package manager failed
    #[error("Package install failed for {}: {reason}", path.display())]
    Install { path: PathBuf, reason: String },

    /// Bootloader command or config edit failed
    #[error("Bootloader command `{command}` failed: {reason}")]
    Bootloader { command: String, reason: String },

    /// The installed kernel has no boot menu entry
    #[error("No boot entry found for kernel {kernel_version}")]
    BootEntryNotFound { kernel_version: String },

    /// Progress file could not be read, parsed or written
    #[error("Progress file error: {0}")]
    Progress(String),

    /// Configuration errors (loading, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (downloads directory, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    Transition(#[from] InstallTransitionError),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    /// Create a progress file error
    pub fn progress(msg: impl Into<String>) -> Self {
        Self::Progress(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a bootloader error for `command`
    pub fn bootloader(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bootloader {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Short, stable name of the error kind for reporting
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CatalogFormat(_) => "CatalogFormatError",
            Self::UnknownFile { .. } => "UnknownFile",
            Self::KernelVersionExtraction { .. } => "KernelVersionExtractionError",
            Self::DuplicateArtifact { .. } => "DuplicateArtifact",
            Self::MissingKernelImage { .. } => "MissingKernelImage",
            Self::Request { .. } | Self::Http { .. } => "RequestFailure",
            Self::Install { .. } => "InstallFailure",
            Self::Bootloader { .. } => "BootloaderFailure",
            Self::BootEntryNotFound { .. } => "NotFound",
            Self::Progress(_) => "ProgressError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Transition(_) => "TransitionError",
        }
    }
}
