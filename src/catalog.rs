//! Release page parsing
//!
//! The upstream release page lists releases newest-first. Each release has
//! an `<h2>` heading carrying the version tag and a `<pre>` block listing
//! the `.deb` packages, one per line, with the filename as the last token.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{InstallerError, Result};

/// Extension of installable release assets
pub const PACKAGE_EXTENSION: &str = ".deb";

static HEADING_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<ver>v\d+\.\d+(\.\d+)?)$").expect("heading version pattern is valid")
});

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+\.\d+(\.\d+)?$").expect("version pattern is valid"));

/// Release tag such as `v0.95` or `v0.95.2`.
///
/// Only compared for equality, never ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ReleaseVersion {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        if VERSION_PATTERN.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InstallerError::CatalogFormat(format!(
                "'{s}' is not a release version"
            )))
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest release found on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: ReleaseVersion,
    /// Asset filenames in page order
    pub filenames: Vec<String>,
}

/// Find the latest release and its package filenames in a release page.
///
/// # Errors
///
/// `CatalogFormat` when no heading carries a version tag, or the matching
/// heading has no package listing next to it.
pub fn latest_release(document: &str) -> Result<Release> {
    let html = Html::parse_document(document);
    let headings = selector("h2")?;
    let listing = selector("pre")?;

    for heading in html.select(&headings) {
        let text = heading.text().collect::<String>();
        let Some(version) = HEADING_VERSION_PATTERN
            .captures(text.trim())
            .and_then(|caps| caps.name("ver"))
        else {
            continue;
        };
        let version: ReleaseVersion = version.as_str().parse()?;

        let block = heading
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|section| section.select(&listing).next())
            .ok_or_else(|| {
                InstallerError::CatalogFormat(format!("release {version} has no package listing"))
            })?;

        let filenames = package_filenames(&block.text().collect::<String>());
        tracing::debug!(%version, packages = filenames.len(), "Found latest release");
        return Ok(Release { version, filenames });
    }

    Err(InstallerError::CatalogFormat(
        "no release heading matches the version pattern".to_string(),
    ))
}

/// Last whitespace-separated token of every line ending in `.deb`
fn package_filenames(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim_end)
        .filter(|line| line.ends_with(PACKAGE_EXTENSION))
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| InstallerError::CatalogFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <div class="release">
    <h2>MPTCP v0.95.2</h2>
    <div class="markdown">
      <pre>
sha256sum
1b29...  linux-headers-5.4.230.mptcp_20230203200031-1_amd64.deb
9c3f...  linux-image-5.4.230.mptcp_20230203200031-1_amd64.deb
77aa...  linux-image-5.4.230.mptcp-dbg_20230203200031-1_amd64.deb
0d1e...  linux-libc-dev_20230203200031-1_amd64.deb
4411...  SHA256SUMS.asc
      </pre>
    </div>
  </div>
  <div class="release">
    <h2>MPTCP v0.95.1</h2>
    <pre>aaaa  linux-image-5.4.200.mptcp_1_amd64.deb</pre>
  </div>
</body></html>
"#;

    #[test]
    fn test_latest_release_is_first_heading() {
        let release = latest_release(PAGE).unwrap();
        assert_eq!(release.version.as_str(), "v0.95.2");
        assert_eq!(
            release.filenames,
            vec![
                "linux-headers-5.4.230.mptcp_20230203200031-1_amd64.deb",
                "linux-image-5.4.230.mptcp_20230203200031-1_amd64.deb",
                "linux-image-5.4.230.mptcp-dbg_20230203200031-1_amd64.deb",
                "linux-libc-dev_20230203200031-1_amd64.deb",
            ]
        );
    }

    #[test]
    fn test_headings_without_version_are_ignored() {
        let page = r#"<div><h2>Assets</h2><pre>x  a.deb</pre></div>
            <div><h2>Release v2.0</h2><pre>x  linux-image-5.4.230.mptcp_1_amd64.deb</pre></div>"#;
        let release = latest_release(page).unwrap();
        assert_eq!(release.version.as_str(), "v2.0");
        assert_eq!(release.filenames.len(), 1);
    }

    #[test]
    fn test_missing_version_heading_is_format_error() {
        let err = latest_release("<html><h2>Nothing here</h2></html>").unwrap_err();
        assert!(matches!(err, InstallerError::CatalogFormat(_)));
    }

    #[test]
    fn test_heading_without_listing_is_format_error() {
        let err = latest_release("<div><h2>v1.2</h2><p>no assets</p></div>").unwrap_err();
        assert!(matches!(err, InstallerError::CatalogFormat(_)));
    }

    #[test]
    fn test_release_version_validation() {
        assert!("v2.0".parse::<ReleaseVersion>().is_ok());
        assert!("v0.95.2".parse::<ReleaseVersion>().is_ok());
        assert!("2.0".parse::<ReleaseVersion>().is_err());
        assert!("v2".parse::<ReleaseVersion>().is_err());
        assert!("v2.0-rc1".parse::<ReleaseVersion>().is_err());
    }
}
