//! Domain types for the mirrored repository and its content partitions.
//!
//! All types are serializable/deserializable via serde + serde_json and use the
//! field names of the on-disk configuration record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// One of the two on-disk content roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    #[default]
    #[serde(alias = "A")]
    A,
    #[serde(alias = "B")]
    B,
}

impl Partition {
    /// The partition that is not `self`.
    pub fn other(self) -> Self {
        match self {
            Partition::A => Partition::B,
            Partition::B => Partition::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::A => "a",
            Partition::B => "b",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Partition::A),
            "b" => Ok(Partition::B),
            other => Err(ConfigError::Invalid(format!(
                "unknown partition '{other}'; expected: a, b"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Basic-auth credentials presented to the remote when `enabled`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Credential {
    #[serde(default)]
    pub enabled: bool,
    /// Older records call this field `email`.
    #[serde(default, alias = "email")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            enabled: true,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Repository source
// ---------------------------------------------------------------------------

/// URL schemes the synchronizer knows how to talk to.
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

/// The remote repository being mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySource {
    pub url: String,
    #[serde(default)]
    pub credential: Credential,
    /// When set, every clone is followed by a large-file asset pull.
    #[serde(default)]
    pub large_file_mode: bool,
}

impl RepositorySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: Credential::default(),
            large_file_mode: false,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_large_file_mode(mut self, enabled: bool) -> Self {
        self.large_file_mode = enabled;
        self
    }

    /// `(username, password)` when credentials are enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credential
            .enabled
            .then(|| (self.credential.username.as_str(), self.credential.password.as_str()))
    }

    /// Checks that `url` is a usable repository address.
    ///
    /// Absolute URLs must use a supported scheme. Strings that do not parse as
    /// URLs are accepted as scp-style (`git@host:path`) or filesystem addresses
    /// as long as they are non-empty and contain no whitespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("repository url is empty".to_string()));
        }
        match Url::parse(url) {
            Ok(parsed) if SUPPORTED_SCHEMES.contains(&parsed.scheme()) => Ok(()),
            Ok(parsed) => Err(ConfigError::Invalid(format!(
                "unsupported repository url scheme '{}'",
                parsed.scheme()
            ))),
            Err(_) if !url.chars().any(char::is_whitespace) => Ok(()),
            Err(err) => Err(ConfigError::Invalid(format!(
                "malformed repository url '{url}': {err}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_other_toggles() {
        assert_eq!(Partition::A.other(), Partition::B);
        assert_eq!(Partition::B.other(), Partition::A);
        assert_eq!(Partition::A.other().other(), Partition::A);
    }

    #[test]
    fn partition_accepts_both_cases() {
        let lower: Partition = serde_json::from_str("\"b\"").expect("lower");
        let upper: Partition = serde_json::from_str("\"B\"").expect("upper");
        assert_eq!(lower, Partition::B);
        assert_eq!(upper, Partition::B);
        assert_eq!(serde_json::to_string(&Partition::B).unwrap(), "\"b\"");
        assert_eq!("A".parse::<Partition>().unwrap(), Partition::A);
        assert!("c".parse::<Partition>().is_err());
    }

    #[test]
    fn credential_debug_redacts_password() {
        let cred = Credential::new("deploy", "hunter2");
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("deploy"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn credential_reads_legacy_email_field() {
        let cred: Credential =
            serde_json::from_str(r#"{"enabled":true,"email":"a@b.c","password":"p"}"#).unwrap();
        assert_eq!(cred.username, "a@b.c");
    }

    #[test]
    fn credentials_only_exposed_when_enabled() {
        let mut source = RepositorySource::new("https://example.com/r.git")
            .with_credential(Credential::new("u", "p"));
        assert_eq!(source.credentials(), Some(("u", "p")));
        source.credential.enabled = false;
        assert_eq!(source.credentials(), None);
    }

    #[test]
    fn validate_accepts_common_addresses() {
        for url in [
            "https://github.com/org/site.git",
            "ssh://git@host/org/site.git",
            "git@github.com:org/site.git",
            "/srv/git/site.git",
            "file:///srv/git/site.git",
        ] {
            assert!(RepositorySource::new(url).validate().is_ok(), "{url}");
        }
    }

    #[test]
    fn validate_rejects_bad_addresses() {
        assert!(RepositorySource::new("").validate().is_err());
        assert!(RepositorySource::new("   ").validate().is_err());
        assert!(RepositorySource::new("ftp://host/repo").validate().is_err());
        assert!(RepositorySource::new("not a url").validate().is_err());
    }
}
