//! Installer configuration
//!
//! Settings come from built-in defaults, optionally overlaid by a JSON file
//! (`--config`), then by command-line flags and the environment. Paths on
//! the target host all derive from `root_dir`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::catalog::ReleaseVersion;

/// Release listing of the multipath-tcp kernel project
pub const DEFAULT_RELEASE_URL: &str = "https://github.com/multipath-tcp/mptcp/releases";
pub const DEFAULT_ROOT_DIR: &str = "/var/lib/mptcp-installer";
pub const DEFAULT_GRUB_CFG: &str = "/boot/grub/grub.cfg";
pub const DEFAULT_GRUB_DEFAULTS: &str = "/etc/default/grub";

/// Name of the progress file under `root_dir`
pub const PROGRESS_FILE_NAME: &str = "progress.json";

/// Installer configuration that can be loaded from a file.
///
/// Missing keys take their default; unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Holds the progress file and downloaded packages
    pub root_dir: PathBuf,
    /// Release listing page; assets live under `<release_url>/download/`
    pub release_url: String,
    /// Generated GRUB menu
    pub grub_cfg: PathBuf,
    /// GRUB defaults file edited to boot the saved entry
    pub grub_default: PathBuf,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            release_url: DEFAULT_RELEASE_URL.to_string(),
            grub_cfg: PathBuf::from(DEFAULT_GRUB_CFG),
            grub_default: PathBuf::from(DEFAULT_GRUB_DEFAULTS),
        }
    }
}

impl InstallerConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            anyhow::bail!("Root directory must be specified");
        }
        if !self.root_dir.is_absolute() {
            anyhow::bail!("Root directory must be absolute: {}", self.root_dir.display());
        }

        let url = self.release_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Release URL must be http(s): {}", self.release_url);
        }

        for (name, path) in [("GRUB menu", &self.grub_cfg), ("GRUB defaults", &self.grub_default)] {
            if !path.is_absolute() {
                anyhow::bail!("{} path must be absolute: {}", name, path.display());
            }
        }

        Ok(())
    }

    /// Parsed release listing URL
    pub fn release_url(&self) -> Result<Url> {
        Url::parse(&self.release_url)
            .with_context(|| format!("Invalid release URL: {}", self.release_url))
    }

    pub fn progress_file(&self) -> PathBuf {
        self.root_dir.join(PROGRESS_FILE_NAME)
    }

    /// Download directory of release `version`: `<root>/var/download/<version>`
    pub fn download_dir(&self, version: &ReleaseVersion) -> PathBuf {
        self.root_dir
            .join("var")
            .join("download")
            .join(version.as_str())
    }
}
