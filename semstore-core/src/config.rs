//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::embedding::EmbedderConfig;
use crate::error::{Error, Result};
use crate::storage::SyncMode;

/// Name used when a request does not specify a collection.
pub const DEFAULT_COLLECTION: &str = "default";

/// Default bound on a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 128;

/// How a new collection's schema is established on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapMode {
    /// Write the typed schema directly; the collection starts empty.
    #[default]
    Declared,
    /// Write one seed row whose vector fixes the schema, then purge it before
    /// the collection is handed out.
    SeedAndPurge,
}

/// Configuration for a [`Store`](crate::Store), fixed once the store is open.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per collection.
    pub root: PathBuf,
    pub default_collection: String,
    /// Metric given to newly created collections.
    pub metric: DistanceMetric,
    pub sync_mode: SyncMode,
    pub bootstrap: BootstrapMode,
    /// `None` disables the bound.
    pub operation_timeout: Option<Duration>,
    pub embedder: EmbedderConfig,
}

impl StoreConfig {
    /// Creates a config rooted at `root` with defaults for everything else.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            default_collection: DEFAULT_COLLECTION.to_string(),
            metric: DistanceMetric::default(),
            sync_mode: SyncMode::default(),
            bootstrap: BootstrapMode::default(),
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            embedder: EmbedderConfig::default(),
        }
    }

    /// Sets the default collection name. Chainable.
    pub fn with_default_collection(mut self, name: impl Into<String>) -> Self {
        self.default_collection = name.into();
        self
    }

    /// Sets the metric for new collections. Chainable.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the WAL sync mode. Chainable.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the schema bootstrap mode. Chainable.
    pub fn with_bootstrap(mut self, mode: BootstrapMode) -> Self {
        self.bootstrap = mode;
        self
    }

    /// Sets or clears the operation timeout. Chainable.
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the embedding backend. Chainable.
    pub fn with_embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::Configuration("storage root path is empty".into()));
        }
        validate_collection_name(&self.default_collection)
            .map_err(|e| Error::Configuration(format!("default collection: {}", e)))?;
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(Error::Configuration(
                "operation timeout must be positive; use None to disable it".into(),
            ));
        }
        self.embedder.validate()
    }
}

/// Collection names become directory names: `[A-Za-z0-9_-]{1,128}`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("collection name is empty".into()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "collection name longer than {} characters",
            MAX_COLLECTION_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "collection name '{}' may only contain letters, digits, '_' and '-'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/tmp/semstore");
        assert_eq!(config.default_collection, "default");
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.bootstrap, BootstrapMode::Declared);
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.embedder.dimension(), 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = StoreConfig::new("data")
            .with_default_collection("profiles")
            .with_metric(DistanceMetric::Euclidean)
            .with_bootstrap(BootstrapMode::SeedAndPurge)
            .with_operation_timeout(None)
            .with_embedder(EmbedderConfig::hashing(16));
        assert_eq!(config.default_collection, "profiles");
        assert_eq!(config.operation_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(StoreConfig::new("").validate().is_err());
        assert!(StoreConfig::new("d")
            .with_default_collection("../etc")
            .validate()
            .is_err());
        assert!(StoreConfig::new("d")
            .with_operation_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("profiles").is_ok());
        assert!(validate_collection_name("news_2024-q1").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a/b").is_err());
        assert!(validate_collection_name(".hidden").is_err());
        assert!(validate_collection_name(&"x".repeat(129)).is_err());
    }
}
