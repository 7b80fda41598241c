//! Error types for gitmirror-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A libgit2 failure; `op` names the step that failed.
    #[error("git {op} failed: {source}")]
    Git {
        op: &'static str,
        #[source]
        source: git2::Error,
    },

    /// The working tree is not on a branch, so there is nothing to pull into.
    #[error("repository at {path} has a detached HEAD; cannot pull")]
    DetachedHead { path: PathBuf },

    /// The remote history diverged from the local branch.
    #[error("branch '{branch}' cannot be fast-forwarded to the remote")]
    NonFastForward { branch: String },

    /// `git lfs pull` exited unsuccessfully.
    #[error("git lfs pull failed ({status}): {output}")]
    Lfs { status: String, output: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Returns a mapper that tags a [`git2::Error`] with the step that failed.
pub(crate) fn git_err(op: &'static str) -> impl FnOnce(git2::Error) -> SyncError {
    move |source| SyncError::Git { op, source }
}
