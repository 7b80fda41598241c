use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use gitmirror_core::{Config, PartitionState, RepositorySource};
use gitmirror_sync::SyncStrategy;

use crate::content::ContentServerManager;

/// Everything the notification and health handlers share.
pub struct AppState {
    pub config_path: PathBuf,
    pub secret: String,
    pub static_port: u16,
    pub version: String,
    pub strategy: SyncStrategy,
    pub(crate) source: RwLock<RepositorySource>,
    pub(crate) partitions: RwLock<PartitionState>,
    pub content: ContentServerManager,
    /// Serializes notification-triggered updates.
    pub(crate) update_lock: Mutex<()>,
    pub started_at: DateTime<Utc>,
    pub(crate) started: Instant,
}

impl AppState {
    pub fn new(config: &Config, config_path: impl Into<PathBuf>, content: ContentServerManager) -> Self {
        let source = config.source();
        Self {
            config_path: config_path.into(),
            secret: config.webhook_secret.clone(),
            static_port: config.static_port,
            version: env!("CARGO_PKG_VERSION").to_string(),
            strategy: SyncStrategy::for_source(&source),
            source: RwLock::new(source),
            partitions: RwLock::new(config.partitions()),
            content,
            update_lock: Mutex::new(()),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Override the strategy derived from the configuration.
    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub async fn partitions(&self) -> PartitionState {
        self.partitions.read().await.clone()
    }

    pub async fn source(&self) -> RepositorySource {
        self.source.read().await.clone()
    }
}
