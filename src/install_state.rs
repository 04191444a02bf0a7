//! Install State Machine
//!
//! Tracks how far one installer run got. Transitions are validated so the
//! orchestrator cannot, say, commit a baseline before the bootloader has been
//! repointed.
//!
//! # Stage Flow
//!
//! ```text
//! Start
//!     ↓
//! CatalogFetched
//!     ↓
//! VersionChecked ──→ UpToDate   (steady state, nothing to do)
//!     ↓
//! FetchingArtifacts             (each artifact Cached or Downloaded)
//!     ↓
//! Installed
//!     ↓
//! BootloaderUpdated
//!     ↓
//! Committed
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;

use thiserror::Error;

/// Stages of one installer run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    /// Nothing done yet
    Start = 0,

    /// Release page fetched and parsed
    CatalogFetched = 1,

    /// Latest release compared with the committed baseline
    VersionChecked = 2,

    /// Packages being reused or downloaded
    FetchingArtifacts = 3,

    /// All packages installed
    Installed = 4,

    /// Boot default points at the new kernel
    BootloaderUpdated = 5,

    /// New baseline persisted (terminal state)
    Committed = 6,

    /// Latest release already installed (terminal state)
    UpToDate = 7,

    /// Run aborted (terminal state)
    Failed = 255,
}

impl InstallStage {
    /// Returns the numeric order of this stage
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::UpToDate | Self::Failed)
    }

    /// Returns the next stage on the install path, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::CatalogFetched),
            Self::CatalogFetched => Some(Self::VersionChecked),
            Self::VersionChecked => Some(Self::FetchingArtifacts),
            Self::FetchingArtifacts => Some(Self::Installed),
            Self::Installed => Some(Self::BootloaderUpdated),
            Self::BootloaderUpdated => Some(Self::Committed),
            Self::Committed | Self::UpToDate | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "Starting",
            Self::CatalogFetched => "Release catalog fetched",
            Self::VersionChecked => "Version checked",
            Self::FetchingArtifacts => "Fetching packages",
            Self::Installed => "Packages installed",
            Self::BootloaderUpdated => "Bootloader updated",
            Self::Committed => "Baseline committed",
            Self::UpToDate => "Already up to date",
            Self::Failed => "Run failed",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: InstallStage, to: InstallStage },

    /// Attempted to go backwards
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: InstallStage, to: InstallStage },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    /// Attempted to transition to the same state
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

/// Stage tracker for one run.
///
/// # Example
///
/// ```
/// use mptcp_installer::install_state::{InstallStage, RunContext};
///
/// let mut ctx = RunContext::new();
/// ctx.transition_to(InstallStage::CatalogFetched).unwrap();
///
/// // Cannot skip stages
/// assert!(ctx.transition_to(InstallStage::Installed).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RunContext {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    history: Vec<InstallStage>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            current: InstallStage::Start,
            failed_at: None,
            history: vec![InstallStage::Start],
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    /// Stage the run was in when it failed, if it failed
    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    /// Every stage entered so far, starting with `Start`
    pub fn history(&self) -> &[InstallStage] {
        &self.history
    }

    /// Transition to `target`, which must be the next stage on the install path.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if current is a terminal state
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }
        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.enter(target);
        Ok(target)
    }

    /// Finish a steady-state run. Only valid right after the version check.
    pub fn finish_up_to_date(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if self.current != InstallStage::VersionChecked {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: InstallStage::UpToDate,
            });
        }
        self.enter(InstallStage::UpToDate);
        Ok(())
    }

    /// Mark the run as failed, remembering the stage it failed in.
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.enter(InstallStage::Failed);
        Ok(())
    }

    fn enter(&mut self, stage: InstallStage) {
        tracing::debug!(from = %self.current, to = %stage, "Stage transition");
        self.history.push(stage);
        self.current = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_to(ctx: &mut RunContext, target: InstallStage) {
        while ctx.current_stage() != target {
            let next = ctx.current_stage().next().unwrap();
            ctx.transition_to(next).unwrap();
        }
    }

    #[test]
    fn test_full_install_path() {
        let mut ctx = RunContext::new();
        walk_to(&mut ctx, InstallStage::Committed);
        assert_eq!(
            ctx.history(),
            &[
                InstallStage::Start,
                InstallStage::CatalogFetched,
                InstallStage::VersionChecked,
                InstallStage::FetchingArtifacts,
                InstallStage::Installed,
                InstallStage::BootloaderUpdated,
                InstallStage::Committed,
            ]
        );
        assert!(ctx.current_stage().is_terminal());
    }

    #[test]
    fn test_cannot_skip_stages() {
        let mut ctx = RunContext::new();
        let err = ctx.transition_to(InstallStage::VersionChecked).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut ctx = RunContext::new();
        walk_to(&mut ctx, InstallStage::Installed);
        let err = ctx.transition_to(InstallStage::CatalogFetched).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));
    }

    #[test]
    fn test_up_to_date_only_after_version_check() {
        let mut ctx = RunContext::new();
        ctx.transition_to(InstallStage::CatalogFetched).unwrap();
        assert!(ctx.finish_up_to_date().is_err());

        ctx.transition_to(InstallStage::VersionChecked).unwrap();
        ctx.finish_up_to_date().unwrap();
        assert_eq!(ctx.current_stage(), InstallStage::UpToDate);
        assert!(ctx.transition_to(InstallStage::FetchingArtifacts).is_err());
    }

    #[test]
    fn test_fail_records_stage() {
        let mut ctx = RunContext::new();
        walk_to(&mut ctx, InstallStage::FetchingArtifacts);
        ctx.fail().unwrap();
        assert_eq!(ctx.current_stage(), InstallStage::Failed);
        assert_eq!(ctx.failed_at(), Some(InstallStage::FetchingArtifacts));
        assert!(ctx.fail().is_err());
    }
}
