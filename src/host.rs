//! Host side effects: package installation and bootloader commands
//!
//! All external commands go through [`run_command`], which logs the exact
//! invocation and captures output. Nothing here is retried.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::bootloader::force_saved_default;
use crate::error::{InstallerError, Result};
use crate::progress::write_atomic;

/// Installs a local package file on the host.
pub trait PackageInstaller {
    fn install(&self, package: &Path) -> Result<()>;
}

/// The bootloader operations the boot selector needs.
///
/// # Contract
///
/// - `read_menu()` returns the generated menu configuration text
/// - `force_saved_default()` makes the bootloader boot the saved entry
/// - `regenerate()` rebuilds the generated menu
/// - `set_default()` persists `entry` as the saved entry
pub trait BootloaderHost {
    fn read_menu(&self) -> Result<String>;
    fn force_saved_default(&self) -> Result<()>;
    fn regenerate(&self) -> Result<()>;
    fn set_default(&self, entry: &str) -> Result<()>;
}

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Human-readable reason for a failed command
    pub fn failure_reason(&self) -> String {
        let code = self
            .exit_code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            code
        } else {
            format!("{code}: {stderr}")
        }
    }
}

/// Run `program` with `args` to completion, capturing its output.
///
/// Stdin is closed; the commands run here are non-interactive.
pub fn run_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> std::io::Result<CommandOutput> {
    let display_args: Vec<_> = args.iter().map(|a| a.as_ref().to_string_lossy()).collect();
    info!("Running: {} {}", program, display_args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };
    if !result.stdout.is_empty() {
        debug!(program, stdout = %result.stdout.trim_end(), "Command output");
    }
    Ok(result)
}

/// `dpkg -i <package>`
#[derive(Debug, Default)]
pub struct Dpkg;

impl PackageInstaller for Dpkg {
    fn install(&self, package: &Path) -> Result<()> {
        let output = run_command("dpkg", &[OsStr::new("-i"), package.as_os_str()]).map_err(|e| {
            InstallerError::Install {
                path: package.to_path_buf(),
                reason: format!("failed to spawn dpkg: {e}"),
            }
        })?;
        if output.success {
            info!("Installed {}", package.display());
            Ok(())
        } else {
            Err(InstallerError::Install {
                path: package.to_path_buf(),
                reason: output.failure_reason(),
            })
        }
    }
}

/// GRUB as configured on Debian-family hosts
#[derive(Debug, Clone)]
pub struct Grub {
    /// Generated menu, e.g. `/boot/grub/grub.cfg`
    pub menu_path: PathBuf,
    /// Defaults file, e.g. `/etc/default/grub`
    pub defaults_path: PathBuf,
}

impl Grub {
    pub fn new(menu_path: impl Into<PathBuf>, defaults_path: impl Into<PathBuf>) -> Self {
        Self {
            menu_path: menu_path.into(),
            defaults_path: defaults_path.into(),
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let output = run_command(program, args)
            .map_err(|e| InstallerError::bootloader(&command, format!("failed to spawn: {e}")))?;
        if output.success {
            Ok(())
        } else {
            Err(InstallerError::bootloader(command, output.failure_reason()))
        }
    }
}

impl BootloaderHost for Grub {
    fn read_menu(&self) -> Result<String> {
        fs::read_to_string(&self.menu_path).map_err(|e| {
            InstallerError::bootloader(
                format!("read {}", self.menu_path.display()),
                e.to_string(),
            )
        })
    }

    fn force_saved_default(&self) -> Result<()> {
        let command = format!("edit {}", self.defaults_path.display());
        let current = fs::read_to_string(&self.defaults_path)
            .map_err(|e| InstallerError::bootloader(&command, e.to_string()))?;
        let updated = force_saved_default(&current);
        if updated == current {
            debug!("GRUB_DEFAULT already saved");
            return Ok(());
        }
        write_atomic(&self.defaults_path, updated.as_bytes())
            .map_err(|e| InstallerError::bootloader(&command, e.to_string()))?;
        info!("Set GRUB_DEFAULT=saved in {}", self.defaults_path.display());
        Ok(())
    }

    fn regenerate(&self) -> Result<()> {
        self.run("update-grub", &[])
    }

    fn set_default(&self, entry: &str) -> Result<()> {
        self.run("grub-set-default", &[entry])
    }
}
