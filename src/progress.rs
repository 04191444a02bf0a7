//! Persisted install progress
//!
//! The progress file records which package of each class was last fetched,
//! plus the committed baseline: release version, kernel version and the
//! versions it replaced. It is rewritten after every state-changing step so
//! an interrupted run resumes from exactly where it stopped.
//!
//! On disk it is a JSON document with two sections:
//!
//! ```json
//! {
//!   "files": { "linux-image": "linux-image-5.4.230.mptcp_..._amd64.deb" },
//!   "general": {
//!     "version": "v0.95.2",
//!     "kernel_version": "5.4.230",
//!     "deprecated_versions": "v0.95;v0.95.1"
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored and missing keys read as absent, so older and
//! newer installers can share the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactClass;
use crate::catalog::ReleaseVersion;
use crate::error::{InstallerError, Result};

/// Separator of the deprecated versions list
pub const DEPRECATED_SEPARATOR: &str = ";";

/// In-memory view of the progress file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    pub files: BTreeMap<ArtifactClass, String>,
    pub version: Option<ReleaseVersion>,
    pub kernel_version: Option<String>,
    pub deprecated_versions: Vec<ReleaseVersion>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressDocument {
    #[serde(default)]
    files: BTreeMap<String, String>,
    #[serde(default)]
    general: GeneralSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeneralSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kernel_version: Option<String>,
    #[serde(default)]
    deprecated_versions: String,
}

impl ProgressRecord {
    fn from_document(doc: ProgressDocument) -> Result<Self> {
        let files = doc
            .files
            .into_iter()
            .filter_map(|(key, filename)| match key.parse::<ArtifactClass>() {
                Ok(class) => Some((class, filename)),
                Err(_) => {
                    tracing::debug!(%key, "Ignoring unknown entry in progress file");
                    None
                }
            })
            .collect();

        let version = doc
            .general
            .version
            .filter(|v| !v.is_empty())
            .map(|v| parse_version(&v))
            .transpose()?;

        let deprecated_versions = doc
            .general
            .deprecated_versions
            .split(DEPRECATED_SEPARATOR)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(parse_version)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            files,
            version,
            kernel_version: doc.general.kernel_version.filter(|v| !v.is_empty()),
            deprecated_versions,
        })
    }

    fn to_document(&self) -> ProgressDocument {
        ProgressDocument {
            files: self
                .files
                .iter()
                .map(|(class, filename)| (class.prefix().to_string(), filename.clone()))
                .collect(),
            general: GeneralSection {
                version: self.version.as_ref().map(ToString::to_string),
                kernel_version: self.kernel_version.clone(),
                deprecated_versions: self
                    .deprecated_versions
                    .iter()
                    .map(ReleaseVersion::as_str)
                    .collect::<Vec<_>>()
                    .join(DEPRECATED_SEPARATOR),
            },
        }
    }
}

fn parse_version(raw: &str) -> Result<ReleaseVersion> {
    raw.parse()
        .map_err(|_| InstallerError::progress(format!("invalid release version '{raw}'")))
}

/// Durable store for [`ProgressRecord`], backed by one file.
///
/// The store is owned by a single run; there is no locking.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    record: ProgressRecord,
}

impl ProgressStore {
    /// Load the store from `path`. A missing file yields an empty record.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let record = match fs::read_to_string(&path) {
            Ok(content) => {
                let doc: ProgressDocument = serde_json::from_str(&content).map_err(|e| {
                    InstallerError::progress(format!("cannot parse {}: {e}", path.display()))
                })?;
                ProgressRecord::from_document(doc)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No progress file yet, starting empty");
                ProgressRecord::default()
            }
            Err(e) => {
                return Err(InstallerError::progress(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self { path, record })
    }

    /// Persist the current record, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        let payload = serde_json::to_vec_pretty(&self.record.to_document())
            .map_err(|e| InstallerError::progress(format!("cannot serialize progress: {e}")))?;
        write_atomic(&self.path, &payload).map_err(|e| {
            InstallerError::progress(format!("cannot write {}: {e}", self.path.display()))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// Filename last fetched for `class`, if any
    pub fn file(&self, class: ArtifactClass) -> Option<&str> {
        self.record.files.get(&class).map(String::as_str)
    }

    pub fn set_file(&mut self, class: ArtifactClass, filename: impl Into<String>) {
        self.record.files.insert(class, filename.into());
    }

    /// Last committed release version
    pub fn version(&self) -> Option<&ReleaseVersion> {
        self.record.version.as_ref()
    }

    pub fn kernel_version(&self) -> Option<&str> {
        self.record.kernel_version.as_deref()
    }

    pub fn deprecated_versions(&self) -> &[ReleaseVersion] {
        &self.record.deprecated_versions
    }

    /// Commit a new baseline in memory; the replaced version, if any, moves
    /// to the deprecated list. Call [`save`](Self::save) to persist.
    pub fn commit(&mut self, version: ReleaseVersion, kernel_version: impl Into<String>) {
        if let Some(previous) = self.record.version.replace(version) {
            self.record.deprecated_versions.push(previous);
        }
        self.record.kernel_version = Some(kernel_version.into());
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers see either the old or the new file and never a partial one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", std::process::id()));
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn version(v: &str) -> ReleaseVersion {
        v.parse().unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::load(dir.path().join("progress.json")).unwrap();
        assert_eq!(store.record(), &ProgressRecord::default());
        assert_eq!(store.version(), None);
        assert_eq!(store.file(ArtifactClass::KernelImage), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");

        let mut store = ProgressStore::load(&path).unwrap();
        store.set_file(ArtifactClass::KernelImage, "linux-image-5.4.230.mptcp_1_amd64.deb");
        store.set_file(ArtifactClass::KernelHeaders, "linux-headers-5.4.230.mptcp_1_amd64.deb");
        store.commit(version("v2.0"), "5.4.230");
        store.save().unwrap();

        let loaded = ProgressStore::load(&path).unwrap();
        assert_eq!(loaded.record(), store.record());
        assert_eq!(loaded.kernel_version(), Some("5.4.230"));
        assert!(loaded.deprecated_versions().is_empty());
    }

    #[test]
    fn test_on_disk_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");

        let mut store = ProgressStore::load(&path).unwrap();
        store.set_file(ArtifactClass::LibcDev, "linux-libc-dev_1_amd64.deb");
        store.commit(version("v1.0"), "5.4.200");
        store.commit(version("v2.0"), "5.4.230");
        store.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["files"]["linux-libc-dev"], "linux-libc-dev_1_amd64.deb");
        assert_eq!(raw["general"]["version"], "v2.0");
        assert_eq!(raw["general"]["kernel_version"], "5.4.230");
        assert_eq!(raw["general"]["deprecated_versions"], "v1.0");
    }

    #[test]
    fn test_unknown_and_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(
            &path,
            r#"{
                "files": { "linux-image": "a.deb", "linux-firmware": "b.deb" },
                "general": { "deprecated_versions": "v1.0;v1.1", "installed_by": "someone" },
                "extra": {}
            }"#,
        )
        .unwrap();

        let store = ProgressStore::load(&path).unwrap();
        assert_eq!(store.file(ArtifactClass::KernelImage), Some("a.deb"));
        assert_eq!(store.record().files.len(), 1);
        assert_eq!(store.version(), None);
        assert_eq!(store.kernel_version(), None);
        assert_eq!(store.deprecated_versions(), &[version("v1.0"), version("v1.1")]);
    }

    #[test]
    fn test_empty_document_is_empty_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{}").unwrap();
        let store = ProgressStore::load(&path).unwrap();
        assert_eq!(store.record(), &ProgressRecord::default());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ProgressStore::load(&path).unwrap_err();
        assert!(matches!(err, InstallerError::Progress(_)));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::load(&path).unwrap();
        store.save().unwrap();
        store.save().unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
