//! Notification-triggered update pipeline.
//!
//! ```text
//! refresh credentials -> sync (blocking pool) -> [flip -> persist -> rebind]
//! ```
//!
//! The bracketed part only runs when the strategy asks for a swap. Updates
//! are serialized through [`AppState`]'s update lock, so two notifications
//! never clone into the same inactive partition at once.

use std::fmt;
use std::time::{Duration, Instant};

use gitmirror_core::{config, Partition};
use gitmirror_sync::{SyncResult, SyncStatus};

use crate::error::{join_err, DaemonError};
use crate::state::AppState;

/// Stages of one update, emitted as the `stage` log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Rejected,
    Authenticated,
    Syncing,
    Synced,
    Swapping,
    Persisted,
    Rebound,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Rejected => "rejected",
            Stage::Authenticated => "authenticated",
            Stage::Syncing => "syncing",
            Stage::Synced => "synced",
            Stage::Swapping => "swapping",
            Stage::Persisted => "persisted",
            Stage::Rebound => "rebound",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed update.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub sync: SyncResult,
    /// Active partition once the update finished.
    pub active: Partition,
    pub swapped: bool,
    pub elapsed: Duration,
}

impl UpdateReport {
    /// Body of the 200 response.
    pub fn message(&self) -> String {
        let what = match (self.sync.status, self.swapped) {
            (_, true) => format!("repository updated; now serving partition {}", self.active),
            (SyncStatus::NoChange, false) => "repository already up to date".to_string(),
            _ => "repository updated".to_string(),
        };
        format!("{what} ({} ms)", self.elapsed.as_millis())
    }
}

/// Run one update against the shared state.
///
/// A failed sync leaves the partition pointer untouched. A failed persist is
/// logged and does not fail the update. A failed rebind does.
pub async fn run_update(state: &AppState) -> Result<UpdateReport, DaemonError> {
    let _serial = state.update_lock.lock().await;
    let started = Instant::now();

    refresh_credentials(state).await;
    let source = state.source().await;
    let partitions = state.partitions().await;
    let strategy = state.strategy;

    tracing::info!(
        stage = %Stage::Syncing,
        strategy = strategy.label(),
        active = %partitions.active(),
        "starting repository update"
    );
    let sync = tokio::task::spawn_blocking(move || strategy.sync(&source, &partitions))
        .await
        .map_err(join_err("sync"))?;

    if !sync.is_success() {
        let reason = sync.error.clone().unwrap_or_else(|| "unknown error".to_string());
        tracing::error!(
            stage = %Stage::Failed,
            target = %sync.target.display(),
            elapsed_ms = sync.elapsed.as_millis() as u64,
            error = %reason,
            "repository update failed"
        );
        return Err(DaemonError::UpdateFailed(reason));
    }
    tracing::info!(
        stage = %Stage::Synced,
        target = %sync.target.display(),
        repaired = sync.repaired,
        elapsed_ms = sync.elapsed.as_millis() as u64,
        head = sync.head.as_ref().map(|h| h.to_string()).unwrap_or_default(),
        "repository synced"
    );

    let Some(next) = sync.swap_to else {
        let active = state.partitions.read().await.active();
        return Ok(UpdateReport {
            sync,
            active,
            swapped: false,
            elapsed: started.elapsed(),
        });
    };

    let swapped = {
        let mut partitions = state.partitions.write().await;
        if partitions.active() != next {
            partitions.flip();
        }
        partitions.clone()
    };
    tracing::info!(
        stage = %Stage::Swapping,
        active = %swapped.active(),
        root = %swapped.active_path().display(),
        "active partition switched"
    );

    let config_path = state.config_path.clone();
    let snapshot = swapped.clone();
    match tokio::task::spawn_blocking(move || snapshot.persist(&config_path)).await {
        Ok(Ok(())) => tracing::info!(
            stage = %Stage::Persisted,
            path = %state.config_path.display(),
            "active partition persisted"
        ),
        Ok(Err(err)) => tracing::warn!(
            path = %state.config_path.display(),
            error = %err,
            "could not persist active partition; a restart will serve the previous one"
        ),
        Err(err) => tracing::warn!(error = %err, "persist task join failure"),
    }

    state
        .content
        .rebind(swapped.active_path(), state.static_port)
        .await
        .map_err(|err| {
            tracing::error!(
                stage = %Stage::Failed,
                root = %swapped.active_path().display(),
                error = %err,
                "content listener swap failed; static content is unavailable"
            );
            err
        })?;
    tracing::info!(stage = %Stage::Rebound, active = %swapped.active(), "swap complete");

    Ok(UpdateReport {
        sync,
        active: swapped.active(),
        swapped: true,
        elapsed: started.elapsed(),
    })
}

/// Pick up a rotated credential from the configuration file.
///
/// Anything other than the credential block is fixed at startup.
async fn refresh_credentials(state: &AppState) {
    let path = state.config_path.clone();
    let loaded = match tokio::task::spawn_blocking(move || config::load_at(&path)).await {
        Ok(Ok(cfg)) => cfg,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "keeping current credentials");
            return;
        }
        Err(_) => return,
    };

    let mut source = state.source.write().await;
    if source.credential != loaded.repo_auth {
        tracing::info!(
            path = %state.config_path.display(),
            "repository credentials reloaded"
        );
        source.credential = loaded.repo_auth;
    }
}
