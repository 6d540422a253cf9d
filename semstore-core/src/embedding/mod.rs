//! Embedding providers.
//!
//! The store only ever talks to an [`EmbeddingProvider`]; which backend sits
//! behind it is chosen explicitly through [`EmbedderConfig`] or by handing the
//! store a ready-made provider.

mod hashing;
#[cfg(feature = "remote")]
mod remote;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

pub use hashing::HashingEmbedder;
#[cfg(feature = "remote")]
pub use remote::{RemoteApi, RemoteEmbedder, RemoteEmbedderConfig};

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSION: usize = 384;

/// Converts text into a fixed-length vector.
///
/// Implementations must be deterministic for identical input and
/// configuration, and every returned vector must have length
/// [`dimension`](EmbeddingProvider::dimension).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Short backend description for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Selects and configures the embedding backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum EmbedderConfig {
    /// Local feature-hashing model. Needs no credentials.
    Hashing { dimension: usize },
    /// HTTP embedding service.
    #[cfg(feature = "remote")]
    Remote(RemoteEmbedderConfig),
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        EmbedderConfig::Hashing {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl EmbedderConfig {
    pub fn hashing(dimension: usize) -> Self {
        EmbedderConfig::Hashing { dimension }
    }

    /// The dimensionality new collections receive under this backend.
    pub fn dimension(&self) -> usize {
        match self {
            EmbedderConfig::Hashing { dimension } => *dimension,
            #[cfg(feature = "remote")]
            EmbedderConfig::Remote(remote) => remote.dimension,
        }
    }

    /// Checks the configuration without contacting any backend.
    pub fn validate(&self) -> Result<()> {
        match self {
            EmbedderConfig::Hashing { dimension } => {
                if *dimension == 0 {
                    return Err(Error::Configuration(
                        "hashing embedder dimension must be at least 1".into(),
                    ));
                }
                Ok(())
            }
            #[cfg(feature = "remote")]
            EmbedderConfig::Remote(remote) => remote.validate(),
        }
    }

    /// Constructs the provider.
    pub fn build(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            EmbedderConfig::Hashing { dimension } => Ok(Arc::new(HashingEmbedder::new(*dimension)?)),
            #[cfg(feature = "remote")]
            EmbedderConfig::Remote(remote) => Ok(Arc::new(RemoteEmbedder::new(remote.clone())?)),
        }
    }
}

/// Builds the provider on first use and hands out the same instance after.
pub(crate) struct LazyEmbedder {
    config: EmbedderConfig,
    cell: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl LazyEmbedder {
    pub(crate) fn new(config: EmbedderConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Wraps an already constructed provider.
    pub(crate) fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config: EmbedderConfig::hashing(provider.dimension()),
            cell: OnceCell::new_with(Some(provider)),
        }
    }

    /// Returns the provider, constructing it if needed. A failed
    /// construction is not cached, so a later call retries it.
    pub(crate) async fn get(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.cell
            .get_or_try_init(|| async {
                let provider = self.config.build()?;
                tracing::info!(
                    backend = provider.name(),
                    dimension = provider.dimension(),
                    "embedding provider initialized"
                );
                Ok::<_, Error>(provider)
            })
            .await
            .map(Arc::clone)
    }

    /// Dimensionality without forcing construction.
    pub(crate) fn dimension(&self) -> usize {
        match self.cell.get() {
            Some(provider) => provider.dimension(),
            None => self.config.dimension(),
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Embeds `text` and checks the result shape.
    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.get().await?;
        let vector = provider.embed(text).await?;
        if vector.len() != provider.dimension() {
            return Err(Error::Embedding(format!(
                "{} returned {} values, expected {}",
                provider.name(),
                vector.len(),
                provider.dimension()
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::Embedding(format!(
                "{} returned non-finite values",
                provider.name()
            )));
        }
        Ok(vector)
    }
}

impl fmt::Debug for LazyEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEmbedder")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 2.0])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_default_config() {
        let config = EmbedderConfig::default();
        assert_eq!(config.dimension(), DEFAULT_DIMENSION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = EmbedderConfig::hashing(0).validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_config_wire_format() {
        let config: EmbedderConfig =
            serde_json::from_str(r#"{"backend":"hashing","dimension":16}"#).unwrap();
        assert_eq!(config, EmbedderConfig::hashing(16));
    }

    #[tokio::test]
    async fn test_lazy_embedder_memoizes() {
        let lazy = LazyEmbedder::new(EmbedderConfig::hashing(8));
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.dimension(), 8);

        let a = lazy.get().await.unwrap();
        let b = lazy.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(lazy.is_initialized());
    }

    #[tokio::test]
    async fn test_wrong_length_rejected() {
        let lazy = LazyEmbedder::with_provider(Arc::new(Broken));
        let err = lazy.embed("hello").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
