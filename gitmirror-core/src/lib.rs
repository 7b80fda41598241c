//! gitmirror core library: domain types, configuration record, partition state.
//!
//! - [`types`]: repository source, credentials, partition identifiers
//! - [`partition`]: [`PartitionState`], the A/B pointer and its persistence
//! - [`config`]: the JSON configuration record: load / init / save
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod partition;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use partition::PartitionState;
pub use types::{Credential, Partition, RepositorySource};
