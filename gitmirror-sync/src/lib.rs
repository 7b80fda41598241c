//! # gitmirror-sync
//!
//! Repository synchronizer: clone, incremental pull and large-file asset
//! retrieval against a target directory.
//!
//! Call [`clone_into`] / [`pull_into`] directly, or pick a [`SyncStrategy`]
//! once from the [`RepositorySource`](gitmirror_core::RepositorySource) and let
//! it decide which partition to touch.

pub mod error;
pub mod lfs;
pub mod repo;
pub mod strategy;

pub use error::SyncError;
pub use repo::{clone_into, describe_head_at, pull_into, HeadInfo, SyncOutcome, REMOTE_NAME};
pub use strategy::{bootstrap, BootstrapAction, SyncResult, SyncStatus, SyncStrategy};
