//! Blue-green partition pointer.
//!
//! Exactly one of the two content roots is active at any instant. The pointer
//! only moves through [`PartitionState::flip`], which has no I/O side effects;
//! durability is a separate [`PartitionState::persist`] step.

use std::path::{Path, PathBuf};

use crate::config;
use crate::error::ConfigError;
use crate::types::Partition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionState {
    active: Partition,
    path_a: PathBuf,
    path_b: PathBuf,
}

impl PartitionState {
    pub fn new(active: Partition, path_a: impl Into<PathBuf>, path_b: impl Into<PathBuf>) -> Self {
        Self {
            active,
            path_a: path_a.into(),
            path_b: path_b.into(),
        }
    }

    pub fn active(&self) -> Partition {
        self.active
    }

    pub fn inactive(&self) -> Partition {
        self.active.other()
    }

    pub fn path_of(&self, partition: Partition) -> &Path {
        match partition {
            Partition::A => &self.path_a,
            Partition::B => &self.path_b,
        }
    }

    pub fn active_path(&self) -> &Path {
        self.path_of(self.active)
    }

    pub fn inactive_path(&self) -> &Path {
        self.path_of(self.inactive())
    }

    /// Toggle the active partition. Returns the newly active partition.
    pub fn flip(&mut self) -> Partition {
        self.active = self.active.other();
        self.active
    }

    /// Write the active partition into the configuration record at `config_path`.
    ///
    /// Only `active_partition` is replaced; every other field is re-read from
    /// disk and written back untouched.
    pub fn persist(&self, config_path: &Path) -> Result<(), ConfigError> {
        let mut stored = config::load_at(config_path)?;
        stored.active_partition = self.active;
        config::save_at(config_path, &stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn state() -> PartitionState {
        PartitionState::new(Partition::A, "/srv/a", "/srv/b")
    }

    #[test]
    fn paths_follow_active_partition() {
        let mut s = state();
        assert_eq!(s.active_path(), Path::new("/srv/a"));
        assert_eq!(s.inactive_path(), Path::new("/srv/b"));

        assert_eq!(s.flip(), Partition::B);
        assert_eq!(s.active_path(), Path::new("/srv/b"));
        assert_eq!(s.inactive_path(), Path::new("/srv/a"));
    }

    #[test]
    fn two_flips_restore_original() {
        let mut s = state();
        s.flip();
        s.flip();
        assert_eq!(s, state());
    }

    #[test]
    fn persist_rewrites_only_active_partition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.repo_url = "https://example.com/site.git".to_string();
        cfg.webhook_secret = "s3cr3t".to_string();
        config::save_at(&path, &cfg).unwrap();

        let mut s = cfg.partitions();
        s.flip();
        s.persist(&path).unwrap();

        let reloaded = config::load_at(&path).unwrap();
        assert_eq!(reloaded.active_partition, Partition::B);
        assert_eq!(reloaded.webhook_secret, "s3cr3t");
        assert_eq!(reloaded.repo_url, cfg.repo_url);
    }

    #[test]
    fn persist_fails_when_config_missing() {
        let dir = TempDir::new().unwrap();
        let err = state().persist(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    }
}
