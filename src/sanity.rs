//! Pre-flight sanity checks for the host
//!
//! Verifies before an install that:
//! - Required host binaries are present
//! - The installer runs with root privileges (EUID 0)

use std::fmt::Write as _;
use std::process::{Command, Stdio};

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }

    /// Multi-line description of every failed check
    pub fn report(&self) -> String {
        let mut out = String::new();
        if !self.is_root {
            out.push_str("Root privileges required: dpkg and grub need to modify the system.\n");
            out.push_str("  Run with sudo or as root.\n");
        }
        if !self.missing_binaries.is_empty() {
            out.push_str("Missing required binaries:\n");
            for binary in &self.missing_binaries {
                let _ = writeln!(out, "  • {} (install: apt install {})", binary, package_for_binary(binary));
            }
        }
        out
    }
}

/// Binaries the install path shells out to
const REQUIRED_BINARIES: &[&str] = &[
    "dpkg",             // Package installation
    "update-grub",      // Menu regeneration
    "grub-set-default", // Persisted default entry
];

/// Map binary names to their Debian package names
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "dpkg" => "dpkg",
        "update-grub" | "grub-set-default" => "grub2-common",
        _ => "unknown",
    }
}

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Check if running as root (EUID 0)
fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all sanity checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| (*binary).to_string())
        .collect();

    let result = SanityCheckResult {
        missing_binaries,
        is_root: is_running_as_root(),
    };
    tracing::debug!(?result, "Pre-flight checks");
    result
}
