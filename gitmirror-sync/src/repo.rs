//! Clone and incremental pull.
//!
//! ## `clone_into`
//!
//! 1. Create the target directory (and parents).
//! 2. Clone with credentials injected through the transport callbacks.
//! 3. Large-file mode: `git lfs pull` (mandatory second step).
//! 4. Describe and log HEAD.
//!
//! ## `pull_into`
//!
//! Large-file repositories are never updated in place: the directory is
//! removed and cloned again. Everything else is fetch + fast-forward.

use std::cell::Cell;
use std::fmt;
use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository};

use gitmirror_core::RepositorySource;

use crate::error::{git_err, io_err, SyncError};
use crate::lfs;

/// Name of the remote every mirror clone tracks.
pub const REMOTE_NAME: &str = "origin";

/// How many times libgit2 may ask for credentials before the attempt is abandoned.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Result of a successful pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// New history was applied to the working tree.
    Updated,
    /// The remote had nothing new; the working tree was left untouched.
    UpToDate,
}

/// Where HEAD points after a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadInfo {
    /// Short branch name, or `HEAD` when detached.
    pub reference: String,
    pub commit: String,
    pub detached: bool,
    pub summary: Option<String>,
}

impl fmt::Display for HeadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.commit[..self.commit.len().min(10)];
        if self.detached {
            write!(f, "detached HEAD at {short}")?;
        } else {
            write!(f, "branch {} at {short}", self.reference)?;
        }
        if let Some(summary) = &self.summary {
            write!(f, " ({summary})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// clone_into
// ---------------------------------------------------------------------------

/// Full clone of `source` into `target`.
///
/// On failure the directory may be partially populated; the caller cleans it
/// up before any retry.
pub fn clone_into(source: &RepositorySource, target: &Path) -> Result<HeadInfo, SyncError> {
    std::fs::create_dir_all(target).map_err(|e| io_err(target, e))?;

    tracing::info!("cloning {} into {}", source.url, target.display());
    let repo = RepoBuilder::new()
        .fetch_options(fetch_options(source))
        .clone(&source.url, target)
        .map_err(git_err("clone"))?;
    tracing::info!("clone into {} complete", target.display());

    if source.large_file_mode {
        lfs::pull(&repo, target, source)?;
    }

    let head = describe_head(&repo)?;
    log_head(target, &head);
    Ok(head)
}

// ---------------------------------------------------------------------------
// pull_into
// ---------------------------------------------------------------------------

/// Bring `existing` up to date with the remote.
///
/// Up-to-date is a success ([`SyncOutcome::UpToDate`]), not an error. Any
/// other failure is returned as-is; deciding whether to delete and re-clone
/// belongs to the caller.
pub fn pull_into(source: &RepositorySource, existing: &Path) -> Result<SyncOutcome, SyncError> {
    if source.large_file_mode {
        tracing::info!(
            "large-file mode: replacing {} with a fresh clone",
            existing.display()
        );
        remove_dir_if_exists(existing)?;
        clone_into(source, existing)?;
        return Ok(SyncOutcome::Updated);
    }

    let repo = Repository::open(existing).map_err(git_err("open"))?;
    let head = repo.head().map_err(git_err("resolve HEAD"))?;
    if !head.is_branch() {
        return Err(SyncError::DetachedHead {
            path: existing.to_path_buf(),
        });
    }
    let branch_ref = head
        .name()
        .ok_or_else(|| SyncError::DetachedHead {
            path: existing.to_path_buf(),
        })?
        .to_string();
    let branch = head.shorthand().unwrap_or(&branch_ref).to_string();
    drop(head);

    tracing::info!("fetching {branch} from {REMOTE_NAME} into {}", existing.display());
    let mut remote = repo.find_remote(REMOTE_NAME).map_err(git_err("find remote"))?;
    remote
        .fetch(&[branch.as_str()], Some(&mut fetch_options(source)), None)
        .map_err(git_err("fetch"))?;

    let fetch_head = repo
        .find_reference("FETCH_HEAD")
        .map_err(git_err("read FETCH_HEAD"))?;
    let incoming = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(git_err("read FETCH_HEAD"))?;
    let (analysis, _) = repo
        .merge_analysis(&[&incoming])
        .map_err(git_err("merge analysis"))?;

    if analysis.is_up_to_date() {
        tracing::info!("{} is already up to date", existing.display());
        return Ok(SyncOutcome::UpToDate);
    }
    if !analysis.is_fast_forward() {
        return Err(SyncError::NonFastForward { branch });
    }

    let mut reference = repo
        .find_reference(&branch_ref)
        .map_err(git_err("find branch"))?;
    reference
        .set_target(incoming.id(), "gitmirror: fast-forward")
        .map_err(git_err("fast-forward"))?;
    repo.set_head(&branch_ref).map_err(git_err("set HEAD"))?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(git_err("checkout"))?;

    let head = describe_head(&repo)?;
    log_head(existing, &head);
    Ok(SyncOutcome::Updated)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Describe HEAD of the repository at `path`.
pub fn describe_head_at(path: &Path) -> Result<HeadInfo, SyncError> {
    let repo = Repository::open(path).map_err(git_err("open"))?;
    describe_head(&repo)
}

pub(crate) fn describe_head(repo: &Repository) -> Result<HeadInfo, SyncError> {
    let head = repo.head().map_err(git_err("resolve HEAD"))?;
    let commit = head.peel_to_commit().map_err(git_err("read HEAD commit"))?;
    let detached = !head.is_branch();
    Ok(HeadInfo {
        reference: if detached {
            "HEAD".to_string()
        } else {
            head.shorthand().unwrap_or("HEAD").to_string()
        },
        commit: commit.id().to_string(),
        detached,
        summary: commit.summary().map(str::to_string),
    })
}

fn log_head(path: &Path, head: &HeadInfo) {
    if head.detached {
        tracing::warn!("{} is on a detached HEAD at {}", path.display(), head.commit);
    } else {
        tracing::info!("{} now at {head}", path.display());
    }
}

/// Transport options with basic-auth credentials when enabled.
pub(crate) fn fetch_options(source: &RepositorySource) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some((username, password)) = source.credentials() {
        let (username, password) = (username.to_string(), password.to_string());
        let attempts = Cell::new(0usize);
        callbacks.credentials(move |_url, _username_from_url, _allowed| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str(
                    "remote rejected the configured credentials",
                ));
            }
            Cred::userpass_plaintext(&username, &password)
        });
    }
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
