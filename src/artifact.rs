//! Release artifact classification
//!
//! Every asset of a release is one of a fixed set of Debian packages. The
//! class is derived from the filename prefix alone, and the same
//! [`ArtifactClass`] value names the entry in the progress file.

use std::sync::LazyLock;

use regex::Regex;
use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator};

use crate::error::{InstallerError, Result};

/// Marker carried by debug-symbol kernel images
pub const DEBUG_MARKER: &str = "-dbg";

static KERNEL_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"linux-image-(?P<ver>[\d.]+)\.mptcp").expect("kernel version pattern is valid")
});

/// Functional role of a release asset.
///
/// The strum name is both the filename prefix and the persisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Display, EnumString, EnumIter, IntoStaticStr)]
pub enum ArtifactClass {
    #[strum(serialize = "linux-image")]
    KernelImage,
    #[strum(serialize = "linux-headers")]
    KernelHeaders,
    #[strum(serialize = "linux-libc-dev")]
    LibcDev,
    #[strum(serialize = "linux-mptcp")]
    MptcpUserland,
}

impl ArtifactClass {
    /// Filename prefix, also used as the key in the progress file
    pub fn prefix(self) -> &'static str {
        self.into()
    }
}

/// One asset of a release, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub class: ArtifactClass,
    pub filename: String,
    /// Set for [`ArtifactClass::KernelImage`] only
    pub kernel_version: Option<String>,
}

/// Outcome of classifying a filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Artifact(Artifact),
    /// Debug kernel image, never installed
    Skip,
}

/// Classify a release asset by its filename.
///
/// # Errors
///
/// - `KernelVersionExtraction` for a kernel image without a parsable version
/// - `UnknownFile` for any prefix outside the known set
pub fn classify(filename: &str) -> Result<Classification> {
    let class = ArtifactClass::iter()
        .find(|class| filename.starts_with(class.prefix()))
        .ok_or_else(|| InstallerError::UnknownFile {
            filename: filename.to_string(),
        })?;

    let kernel_version = if class == ArtifactClass::KernelImage {
        if filename.contains(DEBUG_MARKER) {
            return Ok(Classification::Skip);
        }
        Some(extract_kernel_version(filename)?)
    } else {
        None
    };

    Ok(Classification::Artifact(Artifact {
        class,
        filename: filename.to_string(),
        kernel_version,
    }))
}

/// Extract the kernel version (`5.4.230`) from a kernel image filename
pub fn extract_kernel_version(filename: &str) -> Result<String> {
    KERNEL_VERSION_PATTERN
        .captures(filename)
        .and_then(|caps| caps.name("ver"))
        .map(|ver| ver.as_str().to_string())
        .ok_or_else(|| InstallerError::KernelVersionExtraction {
            filename: filename.to_string(),
        })
}
