//! Update strategies.
//!
//! The strategy is chosen once from the repository source:
//!
//! - [`SyncStrategy::InPlace`]: pull into the active partition; on failure,
//!   delete it and clone once more.
//! - [`SyncStrategy::BlueGreen`]: clean and clone into the inactive partition,
//!   then ask the caller to swap.
//!
//! Both produce a [`SyncResult`] and never return an error: failure is a
//! status the notification endpoint turns into its HTTP response.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use gitmirror_core::{Partition, PartitionState, RepositorySource};

use crate::error::SyncError;
use crate::repo::{self, clone_into, pull_into, remove_dir_if_exists, HeadInfo, SyncOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    InPlace,
    BlueGreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    /// Remote had no new history. Counts as success.
    NoChange,
    Failure,
}

/// Outcome of one sync attempt.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub elapsed: Duration,
    pub error: Option<String>,
    /// Directory the attempt wrote into.
    pub target: PathBuf,
    /// Partition that should become active, when the strategy needs a swap.
    pub swap_to: Option<Partition>,
    /// Set when the first attempt failed and a delete + re-clone repaired it.
    pub repaired: bool,
    pub head: Option<HeadInfo>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, SyncStatus::Success | SyncStatus::NoChange)
    }
}

impl SyncStrategy {
    pub fn for_source(source: &RepositorySource) -> Self {
        if source.large_file_mode {
            SyncStrategy::BlueGreen
        } else {
            SyncStrategy::InPlace
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncStrategy::InPlace => "in-place",
            SyncStrategy::BlueGreen => "blue-green",
        }
    }

    /// Run one sync against the partitions described by `partitions`.
    pub fn sync(&self, source: &RepositorySource, partitions: &PartitionState) -> SyncResult {
        let started = Instant::now();
        match self {
            SyncStrategy::InPlace => {
                let target = partitions.active_path().to_path_buf();
                let mut result = match pull_with_repair(source, &target) {
                    Ok((outcome, repaired)) => SyncResult {
                        status: match outcome {
                            SyncOutcome::Updated => SyncStatus::Success,
                            SyncOutcome::UpToDate => SyncStatus::NoChange,
                        },
                        elapsed: Duration::ZERO,
                        error: None,
                        head: repo::describe_head_at(&target).ok(),
                        target,
                        swap_to: None,
                        repaired,
                    },
                    Err(err) => failure(target, err),
                };
                result.elapsed = started.elapsed();
                result
            }
            SyncStrategy::BlueGreen => {
                let target = partitions.inactive_path().to_path_buf();
                let mut result = match fresh_clone(source, &target) {
                    Ok(head) => SyncResult {
                        status: SyncStatus::Success,
                        elapsed: Duration::ZERO,
                        error: None,
                        target,
                        swap_to: Some(partitions.inactive()),
                        repaired: false,
                        head: Some(head),
                    },
                    Err(err) => failure(target, err),
                };
                result.elapsed = started.elapsed();
                result
            }
        }
    }
}

fn failure(target: PathBuf, err: SyncError) -> SyncResult {
    SyncResult {
        status: SyncStatus::Failure,
        elapsed: Duration::ZERO,
        error: Some(err.to_string()),
        target,
        swap_to: None,
        repaired: false,
        head: None,
    }
}

/// Remove `target` if present, then clone into it.
fn fresh_clone(source: &RepositorySource, target: &Path) -> Result<HeadInfo, SyncError> {
    if target.exists() {
        tracing::info!("cleaning inactive partition {}", target.display());
        remove_dir_if_exists(target)?;
    }
    clone_into(source, target)
}

/// `pull_into`, and on any failure delete the directory and clone once.
///
/// Returns the outcome and whether the repair path ran.
fn pull_with_repair(
    source: &RepositorySource,
    target: &Path,
) -> Result<(SyncOutcome, bool), SyncError> {
    match pull_into(source, target) {
        Ok(outcome) => Ok((outcome, false)),
        Err(err) => {
            tracing::warn!(
                "pull into {} failed ({err}); deleting and cloning again",
                target.display()
            );
            remove_dir_if_exists(target)?;
            clone_into(source, target)?;
            Ok((SyncOutcome::Updated, true))
        }
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// What [`bootstrap`] did to the active partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapAction {
    /// The active path was missing and has been cloned.
    Cloned(HeadInfo),
    /// The active path existed and was updated (`repaired` if re-cloned).
    Pulled { outcome: SyncOutcome, repaired: bool },
    /// The active path existed and updates on start are disabled.
    Skipped,
}

/// Make sure the active partition holds a checkout before serving it.
pub fn bootstrap(
    source: &RepositorySource,
    partitions: &PartitionState,
    update_on_start: bool,
) -> Result<BootstrapAction, SyncError> {
    let active = partitions.active_path();
    if !active.exists() {
        tracing::info!(
            "active partition {} not found at {}; cloning",
            partitions.active(),
            active.display()
        );
        return clone_into(source, active).map(BootstrapAction::Cloned);
    }
    if !update_on_start {
        return Ok(BootstrapAction::Skipped);
    }
    let (outcome, repaired) = pull_with_repair(source, active)?;
    Ok(BootstrapAction::Pulled { outcome, repaired })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_follows_large_file_mode() {
        let simple = RepositorySource::new("https://example.com/r.git");
        let large = simple.clone().with_large_file_mode(true);
        assert_eq!(SyncStrategy::for_source(&simple), SyncStrategy::InPlace);
        assert_eq!(SyncStrategy::for_source(&large), SyncStrategy::BlueGreen);
    }

    #[test]
    fn no_change_counts_as_success() {
        let mut result = failure(PathBuf::from("/tmp/x"), SyncError::NonFastForward {
            branch: "main".to_string(),
        });
        assert!(!result.is_success());
        result.status = SyncStatus::NoChange;
        assert!(result.is_success());
    }
}
