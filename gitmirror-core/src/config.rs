//! JSON configuration record.
//!
//! # Storage layout
//!
//! ```text
//! ./config/
//!   config.json      (rewritten whenever the active partition flips)
//! ```
//!
//! # API pattern
//!
//! - [`load_or_init_at`]: startup path: seed a default record from the
//!   environment when the file is missing, then load it.
//! - [`load_at`]: strict read; a missing file is an error.
//! - [`save_at`]: atomic `.tmp` + rename replace.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{io_err, ConfigError};
use crate::partition::PartitionState;
use crate::types::{Credential, Partition, RepositorySource};

/// Default location of the configuration record, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/config.json";

/// The process configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub repo_url: String,
    #[serde(default = "default_true")]
    pub update_on_start: bool,
    pub target_path_a: PathBuf,
    pub target_path_b: PathBuf,
    #[serde(default)]
    pub active_partition: Partition,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub webhook_port: u16,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub static_port: u16,
    pub log_file_path: PathBuf,
    #[serde(default = "default_log_max_size_mb")]
    pub log_max_size_mb: u64,
    #[serde(default)]
    pub repo_auth: Credential,
    #[serde(default)]
    pub lfs_enabled: bool,
    #[serde(default)]
    pub version: String,
}

fn default_true() -> bool {
    true
}

fn default_log_max_size_mb() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/yourusername/yourrepo.git".to_string(),
            update_on_start: true,
            target_path_a: PathBuf::from("./data/repo_a"),
            target_path_b: PathBuf::from("./data/repo_b"),
            active_partition: Partition::A,
            webhook_port: 8081,
            webhook_secret: String::new(),
            static_port: 8080,
            log_file_path: PathBuf::from("./logs/server.log"),
            log_max_size_mb: default_log_max_size_mb(),
            repo_auth: Credential {
                enabled: false,
                username: "example@example.com".to_string(),
                password: "1234".to_string(),
            },
            lfs_enabled: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Default record with fields overridden from process environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Default record with fields overridden by `lookup`.
    ///
    /// Empty or unparseable values leave the default in place.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let flag = |key: &str| get(key).and_then(|v| parse_bool(&v));

        let mut cfg = Self::default();
        if let Some(v) = get("REPO_URL") {
            cfg.repo_url = v;
        }
        if let Some(v) = flag("UPDATE_ON_START") {
            cfg.update_on_start = v;
        }
        if let Some(v) = get("TARGET_PATH_A") {
            cfg.target_path_a = PathBuf::from(v);
        }
        if let Some(v) = get("TARGET_PATH_B") {
            cfg.target_path_b = PathBuf::from(v);
        }
        if let Some(v) = parse_value(get("ACTIVE_PARTITION")) {
            cfg.active_partition = v;
        }
        if let Some(v) = parse_value(get("WEBHOOK_PORT")) {
            cfg.webhook_port = v;
        }
        if let Some(v) = get("WEBHOOK_SECRET") {
            cfg.webhook_secret = v;
        }
        if let Some(v) = parse_value(get("STATIC_PORT")) {
            cfg.static_port = v;
        }
        if let Some(v) = get("LOG_FILE_PATH") {
            cfg.log_file_path = PathBuf::from(v);
        }
        if let Some(v) = parse_value(get("LOG_MAX_SIZE_MB")) {
            cfg.log_max_size_mb = v;
        }
        if let Some(v) = flag("REPO_AUTH_ENABLED") {
            cfg.repo_auth.enabled = v;
        }
        if let Some(v) = get("REPO_AUTH_USERNAME").or_else(|| get("REPO_AUTH_EMAIL")) {
            cfg.repo_auth.username = v;
        }
        if let Some(v) = get("REPO_AUTH_PASSWORD") {
            cfg.repo_auth.password = v;
        }
        if let Some(v) = flag("LFS_ENABLED") {
            cfg.lfs_enabled = v;
        }
        cfg
    }

    /// Reject records the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source().validate()?;
        if self.target_path_a == self.target_path_b {
            return Err(ConfigError::Invalid(format!(
                "target_path_a and target_path_b must differ (both are {})",
                self.target_path_a.display()
            )));
        }
        if self.log_max_size_mb == 0 {
            return Err(ConfigError::Invalid(
                "log_max_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn source(&self) -> RepositorySource {
        RepositorySource {
            url: self.repo_url.clone(),
            credential: self.repo_auth.clone(),
            large_file_mode: self.lfs_enabled,
        }
    }

    pub fn partitions(&self) -> PartitionState {
        PartitionState::new(
            self.active_partition,
            self.target_path_a.clone(),
            self.target_path_b.clone(),
        )
    }

    /// Log rotation threshold in bytes.
    pub fn log_max_bytes(&self) -> u64 {
        self.log_max_size_mb.saturating_mul(1024 * 1024)
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the record at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed. The stored `version` is replaced with the
/// running build's version, so the next save records it.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: Config =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.version = env!("CARGO_PKG_VERSION").to_string();
    Ok(config)
}

/// Load the record at `path`, first writing an environment-seeded default
/// record when the file does not exist yet.
pub fn load_or_init_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        save_at(path, &Config::from_env())?;
        tracing::info!(path = %path.display(), "configuration file created; review it and restart to apply changes");
    }
    load_at(path)
}

/// Save `config` to `path` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn parse_value<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Legacy records store ports as strings (`"8080"`).
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortCompat {
        Number(u16),
        Text(String),
    }

    match PortCompat::deserialize(deserializer)? {
        PortCompat::Number(port) => Ok(port),
        PortCompat::Text(text) => text
            .trim()
            .trim_start_matches(':')
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = Config::from_env_with(env(&[
            ("REPO_URL", "https://git.example.com/site.git"),
            ("WEBHOOK_PORT", "9001"),
            ("ACTIVE_PARTITION", "B"),
            ("LFS_ENABLED", "true"),
            ("REPO_AUTH_EMAIL", "ops@example.com"),
        ]));
        assert_eq!(cfg.repo_url, "https://git.example.com/site.git");
        assert_eq!(cfg.webhook_port, 9001);
        assert_eq!(cfg.active_partition, Partition::B);
        assert!(cfg.lfs_enabled);
        assert_eq!(cfg.repo_auth.username, "ops@example.com");
        assert_eq!(cfg.static_port, 8080);
    }

    #[test]
    fn unparseable_env_values_keep_defaults() {
        let cfg = Config::from_env_with(env(&[
            ("WEBHOOK_PORT", "eighty"),
            ("UPDATE_ON_START", "maybe"),
            ("LOG_MAX_SIZE_MB", ""),
        ]));
        assert_eq!(cfg.webhook_port, 8081);
        assert!(cfg.update_on_start);
        assert_eq!(cfg.log_max_size_mb, 5);
    }

    #[test]
    fn ports_accept_strings_and_numbers() {
        let json = r#"{
            "repo_url": "https://example.com/r.git",
            "target_path_a": "./a",
            "target_path_b": "./b",
            "webhook_port": "8081",
            "static_port": 8080,
            "log_file_path": "./logs/server.log"
        }"#;
        let cfg: Config = serde_json::from_str(json).expect("parse");
        assert_eq!(cfg.webhook_port, 8081);
        assert_eq!(cfg.static_port, 8080);
        assert_eq!(cfg.active_partition, Partition::A);
        assert!(cfg.update_on_start);
    }

    #[test]
    fn validate_rejects_identical_partition_paths() {
        let mut cfg = Config::default();
        cfg.target_path_b = cfg.target_path_a.clone();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_log_size() {
        let mut cfg = Config::default();
        cfg.log_max_size_mb = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn source_carries_credentials_and_mode() {
        let mut cfg = Config::default();
        cfg.lfs_enabled = true;
        cfg.repo_auth.enabled = true;
        let source = cfg.source();
        assert!(source.large_file_mode);
        assert_eq!(source.credentials(), Some(("example@example.com", "1234")));
    }
}
