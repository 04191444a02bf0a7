//! Incremental install orchestration
//!
//! One run walks the stages of [`InstallStage`]: fetch the release catalog,
//! compare it with the committed baseline, reuse or download each package,
//! install them, repoint the bootloader, and only then commit the new
//! baseline.
//!
//! # Resumability
//!
//! Each downloaded package is recorded in the progress file as soon as it is
//! on disk. A run that dies halfway leaves the baseline untouched, and the
//! next run reuses whatever was already fetched.

use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::artifact::{self, Artifact, ArtifactClass, Classification};
use crate::bootloader::{BootEntry, BootloaderSelector};
use crate::catalog::{self, Release, ReleaseVersion};
use crate::config::InstallerConfig;
use crate::error::{InstallerError, Result};
use crate::host::{BootloaderHost, PackageInstaller};
use crate::http::ReleaseSource;
use crate::install_state::{InstallStage, RunContext};
use crate::progress::ProgressStore;

/// What to do with one package of the release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactAction {
    /// Already fetched; install from this path
    Reuse(PathBuf),
    /// Download to this path
    Fetch(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedArtifact {
    pub artifact: Artifact,
    pub action: ArtifactAction,
}

/// Everything needed to bring the host to a new release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub version: ReleaseVersion,
    /// Baseline being replaced
    pub previous: Option<ReleaseVersion>,
    pub kernel_version: String,
    /// Packages in release page order
    pub artifacts: Vec<PlannedArtifact>,
}

impl InstallPlan {
    pub fn fetch_count(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|p| matches!(p.action, ArtifactAction::Fetch(_)))
            .count()
    }
}

/// Result of comparing the catalog with the committed baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate(ReleaseVersion),
    Available(InstallPlan),
}

/// Summary of a completed install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: ReleaseVersion,
    pub kernel_version: String,
    pub boot_entry: BootEntry,
    /// Filenames downloaded during this run
    pub fetched: Vec<String>,
    /// Filenames reused from earlier runs
    pub reused: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Steady state: latest release already committed, nothing done
    UpToDate(ReleaseVersion),
    Installed(InstallReport),
}

/// Drives one installer run.
///
/// The progress store and every collaborator are borrowed for the run;
/// there is no global state.
pub struct Orchestrator<'a> {
    config: &'a InstallerConfig,
    store: &'a mut ProgressStore,
    source: &'a dyn ReleaseSource,
    packages: &'a dyn PackageInstaller,
    bootloader: BootloaderSelector<'a>,
    ctx: RunContext,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a InstallerConfig,
        store: &'a mut ProgressStore,
        source: &'a dyn ReleaseSource,
        packages: &'a dyn PackageInstaller,
        bootloader: &'a dyn BootloaderHost,
    ) -> Self {
        Self {
            config,
            store,
            source,
            packages,
            bootloader: BootloaderSelector::new(bootloader),
            ctx: RunContext::new(),
        }
    }

    /// Stage tracker of the current run
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Fetch the catalog and work out what a run would do, without side effects.
    pub fn check(&self) -> Result<UpdateCheck> {
        let release = self.fetch_catalog()?;
        self.plan(release)
    }

    /// Run the installer to completion.
    ///
    /// On error the progress store keeps every per-package record saved so
    /// far, but the baseline is not committed.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let result = self.drive();
        if let Err(err) = &result {
            error!(stage = %self.ctx.current_stage(), kind = err.kind(), "Run aborted: {}", err);
            // fail() only errors when the context is already terminal
            let _ = self.ctx.fail();
        }
        result
    }

    fn drive(&mut self) -> Result<RunOutcome> {
        let release = self.fetch_catalog()?;
        self.ctx.transition_to(InstallStage::CatalogFetched)?;

        let plan = match self.plan(release)? {
            UpdateCheck::UpToDate(version) => {
                self.ctx.transition_to(InstallStage::VersionChecked)?;
                self.ctx.finish_up_to_date()?;
                info!(%version, "Already up to date");
                return Ok(RunOutcome::UpToDate(version));
            }
            UpdateCheck::Available(plan) => plan,
        };
        self.ctx.transition_to(InstallStage::VersionChecked)?;
        info!(
            version = %plan.version,
            previous = ?plan.previous.as_ref().map(ReleaseVersion::as_str),
            "Installing release ({} of {} packages to fetch)",
            plan.fetch_count(),
            plan.artifacts.len()
        );

        self.ctx.transition_to(InstallStage::FetchingArtifacts)?;
        let (packages, fetched, reused) = self.fetch_artifacts(&plan)?;

        for package in &packages {
            self.packages.install(package)?;
        }
        self.ctx.transition_to(InstallStage::Installed)?;

        let boot_entry = self.bootloader.select_default(&plan.kernel_version)?;
        self.ctx.transition_to(InstallStage::BootloaderUpdated)?;

        self.store
            .commit(plan.version.clone(), plan.kernel_version.clone());
        self.store.save()?;
        self.ctx.transition_to(InstallStage::Committed)?;
        info!(version = %plan.version, kernel = %plan.kernel_version, "Committed new baseline");

        Ok(RunOutcome::Installed(InstallReport {
            version: plan.version,
            kernel_version: plan.kernel_version,
            boot_entry,
            fetched,
            reused,
        }))
    }

    fn fetch_catalog(&self) -> Result<Release> {
        let document = self.source.fetch_index()?;
        catalog::latest_release(&document)
    }

    /// Compare `release` with the store and decide, per package, reuse or fetch.
    fn plan(&self, release: Release) -> Result<UpdateCheck> {
        if self.store.version() == Some(&release.version) {
            return Ok(UpdateCheck::UpToDate(release.version));
        }

        let artifacts = classify_release(&release)?;
        let kernel_version = artifacts
            .iter()
            .find_map(|a| a.kernel_version.clone())
            .ok_or_else(|| InstallerError::MissingKernelImage {
                version: release.version.to_string(),
            })?;

        let artifacts = artifacts
            .into_iter()
            .map(|artifact| {
                let action = self.action_for(&release.version, &artifact);
                PlannedArtifact { artifact, action }
            })
            .collect();

        Ok(UpdateCheck::Available(InstallPlan {
            version: release.version,
            previous: self.store.version().cloned(),
            kernel_version,
            artifacts,
        }))
    }

    fn action_for(&self, version: &ReleaseVersion, artifact: &Artifact) -> ArtifactAction {
        let dest = self.config.download_dir(version).join(&artifact.filename);
        if self.store.file(artifact.class) != Some(artifact.filename.as_str()) {
            return ArtifactAction::Fetch(dest);
        }

        // Unchanged packages stay in the directory of the release that fetched them
        let previous = self
            .store
            .version()
            .map(|v| self.config.download_dir(v).join(&artifact.filename));
        match std::iter::once(dest.clone())
            .chain(previous)
            .find(|path| path.is_file())
        {
            Some(path) => ArtifactAction::Reuse(path),
            None => {
                warn!(
                    "{} is recorded as fetched but missing on disk, fetching again",
                    artifact.filename
                );
                ArtifactAction::Fetch(dest)
            }
        }
    }

    /// Returns the package paths in plan order, plus fetched and reused names.
    fn fetch_artifacts(
        &mut self,
        plan: &InstallPlan,
    ) -> Result<(Vec<PathBuf>, Vec<String>, Vec<String>)> {
        let mut packages = Vec::with_capacity(plan.artifacts.len());
        let mut fetched = Vec::new();
        let mut reused = Vec::new();

        for planned in &plan.artifacts {
            let filename = &planned.artifact.filename;
            match &planned.action {
                ArtifactAction::Reuse(path) => {
                    info!("Not downloading {}", filename);
                    reused.push(filename.clone());
                    packages.push(path.clone());
                }
                ArtifactAction::Fetch(dest) => {
                    if let Some(dir) = dest.parent() {
                        fs::create_dir_all(dir)?;
                    }
                    info!("Downloading {}...", filename);
                    self.source.fetch_asset(&plan.version, filename, dest)?;

                    self.store.set_file(planned.artifact.class, filename.clone());
                    self.store.save()?;
                    fetched.push(filename.clone());
                    packages.push(dest.clone());
                }
            }
        }
        Ok((packages, fetched, reused))
    }
}

/// Classify every asset of `release`, dropping skipped ones.
///
/// Runs before anything is fetched, so an unexpected asset aborts the run
/// with the progress store untouched.
pub fn classify_release(release: &Release) -> Result<Vec<Artifact>> {
    let mut artifacts: Vec<Artifact> = Vec::with_capacity(release.filenames.len());
    for filename in &release.filenames {
        let artifact = match artifact::classify(filename)? {
            Classification::Artifact(artifact) => artifact,
            Classification::Skip => {
                tracing::debug!("Skipping {}", filename);
                continue;
            }
        };
        if let Some(existing) = artifacts.iter().find(|a| a.class == artifact.class) {
            return Err(duplicate(artifact.class, &existing.filename, filename));
        }
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

fn duplicate(class: ArtifactClass, first: &str, second: &str) -> InstallerError {
    InstallerError::DuplicateArtifact {
        class,
        first: first.to_string(),
        second: second.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(filenames: &[&str]) -> Release {
        Release {
            version: "v2.0".parse().unwrap(),
            filenames: filenames.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_classify_release_drops_debug_images() {
        let artifacts = classify_release(&release(&[
            "linux-image-5.4.230.mptcp_1_amd64.deb",
            "linux-image-5.4.230.mptcp-dbg_1_amd64.deb",
            "linux-headers-5.4.230.mptcp_1_amd64.deb",
        ]))
        .unwrap();
        let classes: Vec<_> = artifacts.iter().map(|a| a.class).collect();
        assert_eq!(classes, vec![ArtifactClass::KernelImage, ArtifactClass::KernelHeaders]);
    }

    #[test]
    fn test_classify_release_rejects_duplicates() {
        let err = classify_release(&release(&[
            "linux-headers-5.4.230.mptcp_1_amd64.deb",
            "linux-headers-5.4.231.mptcp_1_amd64.deb",
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            InstallerError::DuplicateArtifact {
                class: ArtifactClass::KernelHeaders,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_release_stops_at_unknown_file() {
        let err = classify_release(&release(&[
            "linux-image-5.4.230.mptcp_1_amd64.deb",
            "linux-rt-image-5.4.230_amd64.deb",
        ]))
        .unwrap_err();
        assert!(matches!(err, InstallerError::UnknownFile { .. }));
    }
}
