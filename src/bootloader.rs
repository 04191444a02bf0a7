//! Boot default selection
//!
//! After the packages are installed, the generated GRUB menu contains an
//! "advanced options" entry for the new kernel. That entry becomes the saved
//! default so the machine boots the multipath-tcp kernel from now on.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::error::{InstallerError, Result};
use crate::host::BootloaderHost;

/// Marker present in the identifier of every advanced boot entry of the kernel
pub const PRODUCT_MARKER: &str = "mptcp-advanced";

static MENU_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*menuentry\s").expect("menuentry pattern is valid"));
static SUBMENU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^submenu\s").expect("submenu pattern is valid"));
static DEFAULT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*GRUB_DEFAULT\s*=").expect("GRUB_DEFAULT pattern is valid"));
static DEFAULT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=.*$").expect("GRUB_DEFAULT value pattern is valid"));

/// A boot menu entry found in the generated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    /// 1-based position among all `menuentry` lines in file order, top-level
    /// and nested alike. Informational only; selection uses `id`.
    pub index: usize,
    /// `$menuentry_id_option` identifier
    pub id: String,
    /// Identifier of the enclosing submenu, if nested
    pub submenu: Option<String>,
}

impl BootEntry {
    /// Value for `grub-set-default`: `submenu>entry` for nested entries
    pub fn default_target(&self) -> String {
        match &self.submenu {
            Some(submenu) => format!("{submenu}>{}", self.id),
            None => self.id.clone(),
        }
    }
}

/// Identifier of a `menuentry`/`submenu` line: the second to last token,
/// unquoted
fn entry_id(line: &str) -> Option<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let id = tokens.len().checked_sub(2).map(|i| tokens[i])?;
    let id = id.trim_matches('\'');
    (!id.is_empty()).then(|| id.to_string())
}

/// Find the advanced boot entry of `kernel_version` in a generated GRUB menu.
pub fn find_boot_entry(menu: &str, kernel_version: &str) -> Option<BootEntry> {
    let kernel_marker = format!("{kernel_version}.mptcp");
    let mut index = 0;
    let mut submenu = None;

    for line in menu.lines() {
        if SUBMENU.is_match(line) {
            submenu = entry_id(line);
            continue;
        }
        if line.starts_with('}') {
            submenu = None;
            continue;
        }
        if !MENU_ENTRY.is_match(line) {
            continue;
        }
        index += 1;
        if !line.contains(PRODUCT_MARKER) || !line.contains(&kernel_marker) {
            continue;
        }
        let Some(id) = entry_id(line) else {
            continue;
        };
        // Top-level entries close their own block; only indented ones nest
        let nested = line.starts_with(char::is_whitespace);
        return Some(BootEntry {
            index,
            id,
            submenu: if nested { submenu } else { None },
        });
    }
    None
}

/// Rewrite `/etc/default/grub` contents so `GRUB_DEFAULT` is `saved`.
///
/// Every active (uncommented) `GRUB_DEFAULT` assignment gets its whole value
/// replaced; when there is none, one is appended. Commented lines are kept
/// as they are.
pub fn force_saved_default(contents: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if DEFAULT_LINE.is_match(line) {
                found = true;
                DEFAULT_VALUE.replace(line, "=saved").into_owned()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push("GRUB_DEFAULT=saved".to_string());
    }

    let mut out = lines.join("\n");
    if contents.ends_with('\n') || !found {
        out.push('\n');
    }
    out
}

/// Repoints the bootloader default at a kernel.
pub struct BootloaderSelector<'a> {
    host: &'a dyn BootloaderHost,
}

impl<'a> BootloaderSelector<'a> {
    pub fn new(host: &'a dyn BootloaderHost) -> Self {
        Self { host }
    }

    /// Make the advanced boot entry of `kernel_version` the saved default.
    ///
    /// # Errors
    ///
    /// `BootEntryNotFound` when the menu has no entry for the kernel; the
    /// bootloader is left untouched in that case.
    pub fn select_default(&self, kernel_version: &str) -> Result<BootEntry> {
        let menu = self.host.read_menu()?;
        let entry = find_boot_entry(&menu, kernel_version).ok_or_else(|| {
            InstallerError::BootEntryNotFound {
                kernel_version: kernel_version.to_string(),
            }
        })?;
        info!(index = entry.index, id = %entry.id, "Found boot entry for kernel {}", kernel_version);

        self.host.force_saved_default()?;
        self.host.regenerate()?;
        self.host.set_default(&entry.default_target())?;
        info!("Boot default set to {}", entry.default_target());
        Ok(entry)
    }
}
