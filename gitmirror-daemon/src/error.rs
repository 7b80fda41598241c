use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, listeners and update pipeline.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] gitmirror_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] gitmirror_sync::SyncError),

    /// A sync attempt finished with a failure status.
    #[error("repository update failed: {0}")]
    UpdateFailed(String),

    #[error("cannot bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(task: &'static str) -> impl FnOnce(tokio::task::JoinError) -> DaemonError {
    move |err| DaemonError::Join {
        task,
        message: err.to_string(),
    }
}
