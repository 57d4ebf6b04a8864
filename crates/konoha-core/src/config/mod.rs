//! Engine and remote store configuration.
//!
//! `EngineConfig` carries the shared signing key and the timing knobs of the
//! scan and sync paths. `FirestoreConfig` locates the hosted document store.
//! Both are plain JSON documents; the CLI overlays environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{has_http_scheme, non_empty_trimmed};

pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 4_000;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SYNC_BATCH_SIZE: u32 = 50;
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";

/// Runtime configuration of a check-in engine
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Shared key used to sign and verify check-in tokens
    #[serde(default)]
    pub signing_key: String,
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u32,
    #[serde(default)]
    pub firestore: Option<FirestoreConfig>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EngineConfig")
            .field("signing_key", &"[REDACTED]")
            .field("commit_timeout_ms", &self.commit_timeout_ms)
            .field("remote_timeout_ms", &self.remote_timeout_ms)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("sync_batch_size", &self.sync_batch_size)
            .field("firestore", &self.firestore)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            firestore: None,
        }
    }
}

impl EngineConfig {
    /// Default configuration with the given signing key
    #[must_use]
    pub fn with_signing_key(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a JSON config document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.signing_key.trim().is_empty() {
            return Err(Error::Config("signing_key must not be empty".to_string()));
        }
        for (field, value) in [
            ("commit_timeout_ms", self.commit_timeout_ms),
            ("remote_timeout_ms", self.remote_timeout_ms),
            ("sync_interval_secs", self.sync_interval_secs),
            ("sync_batch_size", u64::from(self.sync_batch_size)),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }
        if let Some(firestore) = &self.firestore {
            firestore.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// Location and credentials of a Cloud Firestore database
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FirestoreConfig {
    pub project_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_firestore_database")]
    pub database: String,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .finish()
    }
}

impl FirestoreConfig {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: None,
            base_url: None,
            database: default_firestore_database(),
        }
    }

    /// Base URL without trailing slash, falling back to the public endpoint
    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        non_empty_trimmed(self.base_url.clone()).map_or_else(
            || DEFAULT_FIRESTORE_BASE_URL.to_string(),
            |url| url.trim_end_matches('/').to_string(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if non_empty_trimmed(Some(self.project_id.clone())).is_none() {
            return Err(Error::Config("firestore project_id is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(Error::Config("firestore database must not be empty".to_string()));
        }
        if let Some(url) = non_empty_trimmed(self.base_url.clone()) {
            if !has_http_scheme(&url) {
                return Err(Error::Config(
                    "firestore base_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }
}

const fn default_commit_timeout_ms() -> u64 {
    DEFAULT_COMMIT_TIMEOUT_MS
}

const fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_sync_batch_size() -> u32 {
    DEFAULT_SYNC_BATCH_SIZE
}

fn default_firestore_database() -> String {
    DEFAULT_FIRESTORE_DATABASE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_fills_defaults() {
        let config = EngineConfig::parse(r#"{"signing_key":"k"}"#).unwrap();
        assert_eq!(config, EngineConfig::with_signing_key("k"));
        assert_eq!(config.commit_timeout(), Duration::from_secs(5));
        assert_eq!(config.remote_timeout(), Duration::from_secs(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = EngineConfig::parse(r#"{"signing_key":"k","extra":1}"#).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_empty_key_and_zero_durations() {
        assert!(EngineConfig::default().validate().is_err());

        let mut config = EngineConfig::with_signing_key("k");
        config.commit_timeout_ms = 0;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("commit_timeout_ms"));
    }

    #[test]
    fn firestore_config_validation() {
        let mut firestore = FirestoreConfig::new("konoha-events");
        assert!(firestore.validate().is_ok());
        assert_eq!(firestore.resolved_base_url(), DEFAULT_FIRESTORE_BASE_URL);

        firestore.base_url = Some("http://localhost:8080/v1/".to_string());
        assert_eq!(firestore.resolved_base_url(), "http://localhost:8080/v1");

        firestore.base_url = Some("localhost:8080".to_string());
        assert!(firestore.validate().is_err());

        assert!(FirestoreConfig::new("  ").validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = EngineConfig::with_signing_key("super-secret");
        let mut firestore = FirestoreConfig::new("konoha");
        firestore.api_key = Some("api-secret".to_string());
        config.firestore = Some(firestore);

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("api-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
